//! データモデル

mod deployment;
mod prop;
mod resource;
mod target;
mod unit;

pub use deployment::{Deployment, Setting, Settings, UnitSpec};
pub use prop::{Attribute, ForeignRef, Handle, Prop};
pub use resource::Resource;
pub use target::Target;
pub use unit::{Output, Unit, validate_unit_id};
