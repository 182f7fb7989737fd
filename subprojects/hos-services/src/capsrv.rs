//! Capture (album) services (`caps:a`).

use crate::service_commands;

/// `caps:a` — album accessor. No commands are implemented yet; the guest
/// only needs the session to exist.
#[derive(Debug, Default)]
pub struct IAlbumAccessorService;

service_commands! {
    impl IAlbumAccessorService {}
}
