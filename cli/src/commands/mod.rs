pub mod bootstrap;
pub mod decide;
pub mod inspect;
pub mod validate;
