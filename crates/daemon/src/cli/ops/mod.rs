pub mod health;
pub mod serve;
pub mod status;
pub mod version;

pub use health::Health;
pub use serve::Serve;
pub use status::Status;
pub use version::Version;

crate::command_enum! {
    (Serve, Serve),
    (Health, Health),
    (Status, Status),
    (Version, Version),
}
