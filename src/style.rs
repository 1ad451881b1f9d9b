//! Terminal styling for CLI output
//!
//! Semantic colors keep command output consistent: green/yellow/red for
//! status, cyan for headers and technical values, dim for secondary details.

use crossterm::style::Stylize;

/// Semantic styling on top of crossterm's `Stylize`
///
/// # Examples
///
/// ```
/// use sndsw::style::SndswStyle;
///
/// println!("{}", "PLAYBACK DEVICES:".header());
/// println!("{}", "selected".success());
/// println!("{}", "alsa_output.usb-Generic-00.analog-stereo".technical());
/// ```
pub trait SndswStyle: Stylize {
    /// Section titles such as "PLAYBACK DEVICES:" (cyan bold)
    fn header(self) -> <<Self as Stylize>::Styled as Stylize>::Styled
    where
        Self: Sized,
        <Self as Stylize>::Styled: Stylize,
    {
        self.cyan().bold()
    }

    /// Positive states: "Running", "default", success messages (green)
    fn success(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.green()
    }

    /// Problems: "not connected", "Not running", errors (red)
    fn error(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.red()
    }

    /// Partial outcomes and warnings (yellow)
    fn warning(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.yellow()
    }

    /// Ids, paths, patterns, counts (cyan)
    fn technical(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.cyan()
    }

    /// Secondary details under a main line (dim)
    fn secondary(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.dim()
    }
}

// Implement for all types that implement Stylize (String, &str, etc.)
impl<T: Stylize> SndswStyle for T {}
