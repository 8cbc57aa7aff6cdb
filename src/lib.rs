pub mod assigner;
pub mod error;
pub mod exec;
pub mod object;
pub mod population;
pub mod region;
pub mod split_merge;
pub mod track;
pub mod tree;

mod lapjv;

pub use assigner::{DistanceAssigner, TrackAssigner};
pub use error::TrackError;
pub use exec::ExecutionMode;
pub use object::{ObjectId, ObjectPopulation, TimedObject};
pub use population::{ForbidFn, TrackTreePopulation};
pub use region::Region;
pub use split_merge::{GeometricSplitAndMerge, SplitAndMerge};
pub use track::{Track, TrackArena, TrackId};
pub use tree::{JunctionKind, TrackTree};
