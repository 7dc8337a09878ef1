//! Color palette for terminal output.

use owo_colors::Style;

use crate::domain::ModuleStatus;

/// Every field is a no-op style until [`Styles::colorize`] runs.
#[derive(Default, Clone)]
pub struct Styles {
    pub success: Style,
    pub warning: Style,
    pub error: Style,
    pub info: Style,
    /// Labels and secondary text.
    pub dim: Style,
    pub bold: Style,
    pub header: Style,
    pub url: Style,
}

impl Styles {
    /// Switch to the colored palette.
    pub fn colorize(&mut self) {
        self.success = Style::new().green();
        self.warning = Style::new().yellow();
        self.error = Style::new().red();
        self.info = Style::new().blue();
        self.dim = Style::new().dimmed();
        self.bold = Style::new().bold();
        self.header = Style::new().bold().cyan();
        self.url = Style::new().underline();
    }

    /// Style for a module status column.
    #[must_use]
    pub fn status(&self, status: ModuleStatus) -> Style {
        match status {
            ModuleStatus::Started => self.success,
            ModuleStatus::Starting | ModuleStatus::Stopping => self.info,
            ModuleStatus::Failed => self.error,
            ModuleStatus::Stopped => self.warning,
            ModuleStatus::Unknown => self.dim,
        }
    }
}
