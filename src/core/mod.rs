mod locale;
mod report;

pub use locale::Locale;
pub use report::{DiagnosticReport, PlatformInfo};
