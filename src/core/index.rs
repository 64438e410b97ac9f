use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use crate::IndexType;

#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct BlockIndex(pub IndexType);

impl From<BlockIndex> for usize {
    fn from(value: BlockIndex) -> Self {
        value.0 as usize
    }
}

#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct PointIndex(pub IndexType);

impl From<PointIndex> for usize {
    fn from(value: PointIndex) -> Self {
        value.0 as usize
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphIndexError {
    #[error("max blocks reached")]
    MaxBlocksReached,
    #[error("max connection points reached")]
    MaxPointsReached,
}

pub trait IndexConversions: TryInto<IndexType> {
    fn try_block_index(self) -> Result<BlockIndex, GraphIndexError> {
        self.try_into()
            .map(BlockIndex)
            .map_err(|_| GraphIndexError::MaxBlocksReached)
    }

    fn try_point_index(self) -> Result<PointIndex, GraphIndexError> {
        self.try_into()
            .map(PointIndex)
            .map_err(|_| GraphIndexError::MaxPointsReached)
    }
}

impl IndexConversions for usize {}
