pub mod error;
pub mod observation;
pub mod traits;
pub mod types;

pub use error::*;
pub use observation::MarketObservation;
pub use traits::*;
pub use types::*;
