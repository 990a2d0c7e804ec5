pub mod homeassistant;
pub mod saur;
