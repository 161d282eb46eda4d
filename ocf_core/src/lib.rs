pub mod block;
pub mod codec;
pub mod config;
pub mod datum;
pub mod error;
pub mod format;
pub mod input;
pub mod reader;
pub mod schema;
pub mod split;
pub mod sync;
pub mod varint;
pub mod writer;

pub use codec::{Codec, CodecRegistry, NullCodec};
pub use config::JobConfig;
pub use datum::{DatumReader, DatumWriter, Value, ValueReader, ValueWriter};
pub use error::{Error, Result};
pub use format::{Header, MAGIC};
pub use input::{InputOpener, LocalFs, SeekableInput};
pub use reader::{block_index, BlockInfo, ContainerReader};
pub use schema::Schema;
pub use split::{plan_splits, FileSplit, Slot, SplitReader, SplitState};
pub use sync::{FlushPolicy, SyncMarker, SYNC_SIZE};
pub use writer::{ContainerWriter, WriterOptions};
