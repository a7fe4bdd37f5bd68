pub mod assets;
pub mod bus;
pub mod input;
pub mod scheduler;
pub mod shapes;
