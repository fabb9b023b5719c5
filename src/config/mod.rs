pub mod locator;
pub mod params;
pub mod schema;
pub mod steps;

pub use locator::{Locator, Target};
pub use params::{ParamDef, Params};
pub use schema::{DownloadsConfig, SessionConfig, SessionMode, Site, Timeouts, WorkflowConfig};
pub use steps::{Interaction, OptionChoice, Step, WaitState};
