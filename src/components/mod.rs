pub mod brush;
pub mod crop;
pub mod history;
pub mod move_tool;
pub mod snapping;
pub mod tools;
