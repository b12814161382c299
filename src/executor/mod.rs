pub mod dispatcher;
pub mod fuzzy;
pub mod input;
pub mod resolver;
pub mod safety;
pub mod scroller;
pub mod text_input;
