//! Filesystem proxy services (`fsp-srv`).
//!
//! Only the save-data enumeration surface is implemented: the reader
//! reports at most the running title's own save, which is all offline
//! titles look for. Actual filesystem access is out of scope.

use hos_sf::{IpcRequest, IpcResponse};
use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::{CommandResult, ServiceContext, service_commands};

/// Save data storage space selector.
const SAVE_DATA_SPACE_ID_USER: u8 = 1;
/// Account save data type.
const SAVE_DATA_TYPE_ACCOUNT: u8 = 1;

/// Wire layout of one save data listing entry (0x60 bytes).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct SaveDataInfo {
    /// Save data id.
    pub save_data_id: u64,
    /// Storage space the save lives in.
    pub space_id: u8,
    /// Save data type.
    pub save_type: u8,
    /// Reserved padding.
    pub _pad0: [u8; 6],
    /// Owning user id.
    pub user_id: [u8; 0x10],
    /// System save data id (zero for application saves).
    pub system_save_data_id: u64,
    /// Owning application id.
    pub application_id: u64,
    /// Save image size in bytes.
    pub size: u64,
    /// Save index.
    pub index: u16,
    /// Rank (primary/secondary).
    pub rank: u8,
    /// Reserved padding.
    pub _pad1: [u8; 0x25],
}
const_assert_eq!(size_of::<SaveDataInfo>(), 0x60);

/// `fsp-srv` — filesystem proxy entry point.
#[derive(Debug, Default)]
pub struct IFileSystemProxy;

impl IFileSystemProxy {
    /// Associates the session with the calling process. The pid descriptor
    /// carries no information this implementation needs.
    fn set_current_process(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        Ok(())
    }

    /// Opens a reader over all save data.
    fn open_save_data_info_reader(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager.register_service(
            Box::new(ISaveDataInfoReader::default()),
            ctx.session,
            ctx.process,
            res,
        )
    }

    /// Opens a reader filtered to one storage space.
    fn open_save_data_info_reader_by_save_data_space_id(
        &mut self,
        ctx: &ServiceContext<'_>,
        req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let _space_id: u8 = req.pop()?;
        self.open_save_data_info_reader(ctx, req, res)
    }
}

service_commands! {
    impl IFileSystemProxy {
        0x1 => set_current_process,
        0x3C => open_save_data_info_reader,
        0x3D => open_save_data_info_reader_by_save_data_space_id,
    }
}

/// Save data listing cursor.
///
/// The listing is synthesized from the running title: one account save
/// entry when application metadata is present, nothing otherwise.
#[derive(Debug, Default)]
pub struct ISaveDataInfoReader {
    position: u64,
}

impl ISaveDataInfoReader {
    /// Fills the output buffer with listing entries and pushes the count
    /// read; a zero count tells the guest the enumeration is done.
    fn read_save_data_info(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let entries = Self::listing(ctx);
        let out = res.out_buffer(0)?;
        let capacity = out.capacity() / size_of::<SaveDataInfo>();

        let mut written = 0u64;
        while let Some(entry) = entries.get((self.position + written) as usize) {
            if written as usize >= capacity {
                break;
            }
            out.write(written as usize * size_of::<SaveDataInfo>(), entry)?;
            written += 1;
        }
        self.position += written;

        res.push(written);
        Ok(())
    }

    fn listing(ctx: &ServiceContext<'_>) -> Vec<SaveDataInfo> {
        let Some(process) = ctx.state.process() else {
            return Vec::new();
        };
        let Some(metadata) = process.metadata().cloned() else {
            return Vec::new();
        };
        let mut entry = SaveDataInfo::new_zeroed();
        entry.save_data_id = 1;
        entry.space_id = SAVE_DATA_SPACE_ID_USER;
        entry.save_type = SAVE_DATA_TYPE_ACCOUNT;
        entry.application_id = metadata.title_id;
        vec![entry]
    }
}

service_commands! {
    impl ISaveDataInfoReader {
        0x0 => read_save_data_info,
    }
}
