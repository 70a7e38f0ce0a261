use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use ndarray::{ArrayView2, ArrayView3, ArrayViewMut3, Axis};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CorrectError, Result};
use crate::frame::to_hwc;
use crate::io::npy::read_npy;

const MEMMAP_EXTENSION: &str = "map";

/// File-backed stack of equally shaped (height, width, channels) f32 arrays.
///
/// The stack lives in a `memmap_<uuid>.map` file so that thousands of images
/// can be addressed by index without being resident in RAM. Reads go through
/// `&self` and may run on many threads; every write needs `&mut self`, so
/// parallel workers must return owned results that the owner writes back.
pub struct ArrayStack {
    path: PathBuf,
    mmap: MmapMut,
    count: usize,
    item_dim: (usize, usize, usize),
}

impl ArrayStack {
    /// Allocate a zero-filled stack of `count` items in `dir`.
    pub fn create(dir: &Path, count: usize, item_dim: (usize, usize, usize)) -> Result<Self> {
        if count == 0 {
            return Err(CorrectError::EmptySequence);
        }
        let (h, w, c) = item_dim;
        let item_len = h * w * c;
        if item_len == 0 {
            return Err(CorrectError::Config(format!(
                "cannot create a stack of empty {h}x{w}x{c} items"
            )));
        }
        let byte_len = count
            .checked_mul(item_len)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
            .ok_or_else(|| CorrectError::Config("memory-mapped stack size overflow".into()))?;

        fs::create_dir_all(dir)?;
        let path = dir.join(format!("memmap_{}.{MEMMAP_EXTENSION}", Uuid::new_v4()));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.set_len(byte_len as u64)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        debug!(path = %path.display(), count, ?item_dim, "Created memory-mapped stack");
        Ok(Self {
            path,
            mmap,
            count,
            item_dim,
        })
    }

    /// Load a list of `.npy` files sequentially into a new stack.
    ///
    /// The first file defines the item shape; a file that cannot be read or
    /// whose shape differs from the first is a fatal error.
    pub fn from_npy_files(
        dir: &Path,
        files: &[PathBuf],
        on_progress: impl Fn(usize),
    ) -> Result<Self> {
        let first_path = files.first().ok_or(CorrectError::EmptySequence)?;
        let first = to_hwc(read_npy::<f32>(first_path)?)?;

        let mut stack = Self::create(dir, files.len(), first.dim())?;
        stack.write_item(0, first.view())?;
        on_progress(1);

        for (i, path) in files.iter().enumerate().skip(1) {
            let item = to_hwc(read_npy::<f32>(path)?)?;
            stack.write_item(i, item.view())?;
            on_progress(i + 1);
        }

        info!(
            count = files.len(),
            shape = ?stack.item_dim,
            path = %stack.path.display(),
            "Loaded numpy files into memmap"
        );
        Ok(stack)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn item_dim(&self) -> (usize, usize, usize) {
        self.item_dim
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn item_len(&self) -> usize {
        let (h, w, c) = self.item_dim;
        h * w * c
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.count {
            return Err(CorrectError::IndexOutOfRange {
                index,
                total: self.count,
            });
        }
        Ok(())
    }

    fn values(&self) -> &[f32] {
        // The mapping is page aligned and sized in whole f32s.
        bytemuck::cast_slice(&self.mmap[..])
    }

    fn values_mut(&mut self) -> &mut [f32] {
        bytemuck::cast_slice_mut(&mut self.mmap[..])
    }

    /// Zero-copy view of one item.
    pub fn item(&self, index: usize) -> Result<ArrayView3<'_, f32>> {
        self.check_index(index)?;
        let len = self.item_len();
        let start = index * len;
        Ok(ArrayView3::from_shape(
            self.item_dim,
            &self.values()[start..start + len],
        )?)
    }

    /// Zero-copy view of one channel plane of one item.
    pub fn channel(&self, index: usize, channel: usize) -> Result<ArrayView2<'_, f32>> {
        let item = self.item(index)?;
        if channel >= self.item_dim.2 {
            return Err(CorrectError::IndexOutOfRange {
                index: channel,
                total: self.item_dim.2,
            });
        }
        Ok(item.index_axis_move(Axis(2), channel))
    }

    /// Overwrite one item.
    pub fn write_item(&mut self, index: usize, data: ArrayView3<f32>) -> Result<()> {
        self.check_index(index)?;
        if data.dim() != self.item_dim {
            return Err(CorrectError::ShapeMismatch {
                expected: self.item_dim,
                actual: data.dim(),
            });
        }
        let len = self.item_len();
        let start = index * len;
        let dst = &mut self.values_mut()[start..start + len];
        for (d, &s) in dst.iter_mut().zip(data.iter()) {
            *d = s;
        }
        Ok(())
    }

    /// Overwrite one channel plane of one item.
    pub fn write_channel(
        &mut self,
        index: usize,
        channel: usize,
        plane: ArrayView2<f32>,
    ) -> Result<()> {
        self.check_index(index)?;
        let (h, w, c) = self.item_dim;
        if channel >= c {
            return Err(CorrectError::IndexOutOfRange {
                index: channel,
                total: c,
            });
        }
        if plane.dim() != (h, w) {
            return Err(CorrectError::ShapeMismatch {
                expected: self.item_dim,
                actual: (plane.nrows(), plane.ncols(), 1),
            });
        }
        let len = self.item_len();
        let start = index * len;
        let item_dim = self.item_dim;
        let slice = &mut self.values_mut()[start..start + len];
        let mut view = ArrayViewMut3::from_shape(item_dim, slice)?;
        view.index_axis_mut(Axis(2), channel).assign(&plane);
        Ok(())
    }

    /// Flush outstanding writes to the backing file.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }
}

impl Drop for ArrayStack {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "Could not remove memmap file");
        }
    }
}

/// Delete every `*.map` file in `dir`. Returns the number of files removed.
///
/// Must run before a stack is regenerated so stale, possibly differently
/// sized backing files are never addressed.
pub fn purge_stale_maps(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(MEMMAP_EXTENSION) {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!(dir = %dir.display(), removed, "Removed stale memmap files");
    }
    Ok(removed)
}
