use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::TiffResult;

use crate::thumbnail::Thumbnail;

/// Tiles per mosaic plane, columns across then rows down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    pub columns: usize,
    pub rows: usize,
}

impl TileGrid {
    pub fn capacity(&self) -> usize {
        self.columns * self.rows
    }
}

impl Default for TileGrid {
    fn default() -> Self {
        Self {
            columns: 20,
            rows: 20,
        }
    }
}

/// Stack of equal-extent mosaic planes, one per chunk of `grid.capacity()`
/// thumbnails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atlas {
    pub grid: TileGrid,
    pub tile_width: usize,
    pub tile_height: usize,
    pub tiles: usize,
    pub planes: Vec<Vec<u8>>,
}

impl Atlas {
    /// `None` when there is nothing to tile or the thumbnails differ in size.
    pub fn assemble(thumbnails: &[Thumbnail], grid: TileGrid) -> Option<Self> {
        let first = thumbnails.first()?;
        let (tile_width, tile_height) = (first.width, first.height);
        if grid.capacity() == 0
            || thumbnails
                .iter()
                .any(|thumb| thumb.width != tile_width || thumb.height != tile_height)
        {
            return None;
        }

        let plane_width = grid.columns * tile_width;
        let planes = thumbnails
            .chunks(grid.capacity())
            .map(|chunk| {
                // short final chunks keep the full extent, unused slots stay zero
                let mut plane = vec![0u8; plane_width * grid.rows * tile_height];
                for (slot, thumb) in chunk.iter().enumerate() {
                    let left = (slot % grid.columns) * tile_width;
                    let top = (slot / grid.columns) * tile_height;
                    for (row, line) in thumb.pixels.chunks_exact(tile_width).enumerate() {
                        let start = (top + row) * plane_width + left;
                        plane[start..start + tile_width].copy_from_slice(line);
                    }
                }
                plane
            })
            .collect();

        Some(Self {
            grid,
            tile_width,
            tile_height,
            tiles: thumbnails.len(),
            planes,
        })
    }

    pub fn width(&self) -> usize {
        self.grid.columns * self.tile_width
    }

    pub fn height(&self) -> usize {
        self.grid.rows * self.tile_height
    }

    /// Index of the thumbnail covering pixel `(x, y)` of plane `z`, or `None`
    /// for padding and out-of-range coordinates.
    pub fn locate(&self, x: usize, y: usize, z: usize) -> Option<usize> {
        if x >= self.width() || y >= self.height() || z >= self.planes.len() {
            return None;
        }
        let index = z * self.grid.capacity() + (y / self.tile_height) * self.grid.columns
            + x / self.tile_width;
        (index < self.tiles).then_some(index)
    }

    /// One 8-bit grayscale page per plane.
    pub fn write_tiff(&self, path: &Path) -> TiffResult<()> {
        let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
        for plane in &self.planes {
            encoder.write_image::<colortype::Gray8>(
                self.width() as u32,
                self.height() as u32,
                plane,
            )?;
        }
        Ok(())
    }
}
