pub mod item;
pub mod loader;
pub mod series_key;
pub mod volume;

pub use item::{IntensityStats, Item, ValidatorOutcome};
pub use loader::{DecodeOutcome, DecodedImage, Decoder};
pub use series_key::SeriesKey;
pub use volume::{PixelType, Samples, Volume};
