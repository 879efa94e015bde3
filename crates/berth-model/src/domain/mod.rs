mod container;
pub use container::{ContainerDetails, ContainerState, ContainerSummary, PortBinding};

mod image;
pub use image::ImageRef;

mod mount;
pub use mount::{Labels, Mount, PortMap};

mod input;
pub use input::{InputSet, StagedInput};

mod instance;
pub use instance::Instance;

/// Prefix the runtime puts in front of every container name alias.
pub const NAME_SEPARATOR: char = '/';
