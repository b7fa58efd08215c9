//! Header checks shared by every engine.

use crate::{compute_difficulty, ConsensusError};
use lattice_types::BlockHeader;

/// Verify height, timestamp and difficulty of a header against its parent.
pub fn verify_header_common(
    header: &BlockHeader,
    parent: &BlockHeader,
) -> Result<(), ConsensusError> {
    if header.height != parent.height + 1 {
        return Err(ConsensusError::InvalidHeight {
            height: header.height,
            parent_height: parent.height,
        });
    }

    if header.timestamp < parent.timestamp {
        return Err(ConsensusError::TimestampTooOld);
    }

    let expected = compute_difficulty(header.timestamp, parent);
    if header.difficulty != expected {
        return Err(ConsensusError::InvalidDifficulty {
            actual: header.difficulty,
            expected,
        });
    }

    Ok(())
}
