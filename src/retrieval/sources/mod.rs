mod academic;
mod encyclopedia;
mod web_search;

pub use academic::AcademicSource;
pub use encyclopedia::EncyclopediaSource;
pub use web_search::WebSearchSource;
