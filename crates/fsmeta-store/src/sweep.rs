//! Reclamation sweep over a packed inode id sequence.

use crate::codec::{INODE_ID_LEN, decode_inode};
use crate::trash::PurgeSource;
use fsmeta_common::{Error, InodeId, Result};
use tracing::{debug, info};

/// Purge every id in `packed`, one atomic unit per id.
///
/// `purge_one` is expected to run and commit its own transaction. The sweep
/// stops at the first error; ids purged before it stay purged. A trailing
/// partial id is reported as malformed after all complete ids are applied.
/// Returns the number of ids purged.
pub fn run<F>(packed: &[u8], mut purge_one: F) -> Result<usize>
where
    F: FnMut(InodeId) -> Result<PurgeSource>,
{
    let chunks = packed.chunks_exact(INODE_ID_LEN);
    let tail = chunks.remainder().len();

    info!("reclamation sweep over {} inodes", packed.len() / INODE_ID_LEN);
    let mut purged = 0;
    for chunk in chunks {
        let inode = decode_inode(chunk)?;
        let source = purge_one(inode)?;
        debug!("inode {} purged ({:?})", inode, source);
        purged += 1;
    }

    if tail != 0 {
        return Err(Error::malformed(format!(
            "{tail} trailing bytes after {purged} packed inodes"
        )));
    }
    info!("reclamation sweep purged {} inodes", purged);
    Ok(purged)
}
