mod factory;
mod indictrans;
mod interface;

pub use factory::TranslatorFactory;
pub use indictrans::IndicTransEngine;
pub use interface::Translator;
