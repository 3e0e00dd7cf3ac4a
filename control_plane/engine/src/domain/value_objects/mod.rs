pub mod dependency;
pub mod domain_event;
pub mod exit_status;
pub mod lifecycle_state;
pub mod property;

pub use dependency::DependencyType;
pub use domain_event::{DomainEvent, SourceCategory};
pub use exit_status::ChildExitStatus;
pub use lifecycle_state::{AdminState, UsageState};
pub use property::{compare, Action, DataType, PropertyValue, SimpleType};
