pub mod catalog;
pub mod diagnosis;
pub mod inference;
pub mod model_manager;
