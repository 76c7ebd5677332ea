pub mod scraper;

pub use scraper::{ScrapedShifts, ScrapingError, ScrapingErrorKind, scrape};
