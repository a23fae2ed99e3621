pub mod batch;
pub mod estimate;
pub mod history;
pub mod setup;
pub mod ui;
