// Crate root: declare modules and control visibility
pub mod debug_info;
pub mod decoder;
pub mod error;
pub mod image;
pub mod kernel;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod symbols;
pub mod view;

// Re-export commonly used API from the library for binaries/tests
pub use decoder::{ArchWidth, DecodedInstruction, Disassembler};
pub use error::{DisasmError, ImageError, ResolveMiss};
pub use image::LoadedImage;
pub use kernel::KernelMapConfig;
pub use registry::ImageRegistry;
pub use resolver::Resolver;
pub use view::{DisassemblyView, InstructionRow, RebuildSummary};
