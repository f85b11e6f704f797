use std::fmt;
use std::sync::Arc;

/// Address of one tile in a media's pyramid.
///
/// Level 0 is the coarsest level; rows and columns count from the top-left
/// corner of the level's grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    /// Media identifier the pyramid was built for
    pub media_id: Arc<str>,

    /// Pyramid level (0 = coarsest)
    pub level: u32,

    /// Row within the level grid
    pub row: u32,

    /// Column within the level grid
    pub column: u32,
}

impl TileId {
    pub fn new(media_id: impl Into<Arc<str>>, level: u32, row: u32, column: u32) -> Self {
        Self {
            media_id: media_id.into(),
            level,
            row,
            column,
        }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}/{}_{}",
            self.media_id, self.level, self.row, self.column
        )
    }
}
