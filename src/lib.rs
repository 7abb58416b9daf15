pub mod budget;
pub mod codec;
pub mod container;
pub mod extract;
pub mod pipeline;
pub mod table;

pub use codec::{CodecId, Decompressor, DecodedPayload};
pub use container::{frame, Envelope, FrameError, FrameResult};
pub use extract::{extract, Cell, CellKind, Extractor};
pub use pipeline::{decode_batch, decode_container, decode_text, DecodeError, DecodeOptions};
pub use table::{to_table, TableResult};
