pub mod factory;
pub mod source;
pub mod writer;

pub use factory::JsonPlanFactory;
pub use source::FilePlanSource;
pub use writer::FilePlanWriter;
