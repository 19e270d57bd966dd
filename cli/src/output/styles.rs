//! Terminal stylesheet (owo-colors).

use outpost_common::TerminalStatus;
use owo_colors::Style;

/// Colours for every kind of line outpost prints. All plain until
/// [`Styles::colorize`] runs, so `--no-color` and non-TTY output need no
/// special casing.
#[derive(Default, Clone)]
pub struct Styles {
    pub success: Style,
    pub warning: Style,
    pub error: Style,
    pub info: Style,
    /// Labels, file names and other secondary text.
    pub dim: Style,
    pub header: Style,
}

impl Styles {
    pub fn colorize(&mut self) {
        self.success = Style::new().green();
        self.warning = Style::new().yellow();
        self.error = Style::new().red();
        self.info = Style::new().blue();
        self.dim = Style::new().dimmed();
        self.header = Style::new().bold().cyan();
    }

    /// Style for a session's terminal status.
    #[must_use]
    pub fn status(&self, status: &TerminalStatus) -> Style {
        match status {
            TerminalStatus::Completed => self.success,
            TerminalStatus::Cancelled => self.warning,
            TerminalStatus::Failed { .. } => self.error,
        }
    }
}
