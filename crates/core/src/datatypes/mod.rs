//! Nominal wire datatypes.
//!
//! These types carry the Data API's tagged wire forms (`$uuid`, `$objectId`,
//! `$date`, `$binary`) through serde, so documents and rows round-trip
//! without an out-of-band type registry:
//!
//! - Serialization produces the canonical wire form.
//! - Deserialization tolerates both the tagged form (collections) and the
//!   bare form tables use (plain strings, arrays).

mod big_number;
mod blob;
mod date;
mod duration;
mod id;
mod map;
mod object_id;
mod uuid;
mod vector;

pub use big_number::BigNumber;
pub use blob::DataApiBlob;
pub use date::DataApiTimestamp;
pub use duration::DataApiDuration;
pub use id::SomeId;
pub use map::DataApiMap;
pub use object_id::ObjectId;
pub use uuid::DataApiUuid;
pub use vector::DataApiVector;
