//! Owned vector sets and their on-disk format.
//!
//! A [`VectorSet`] holds `n` vectors of `dims` dimensions in one flat `f32`
//! buffer, plus the metadata the binary format carries: a name, the set mean,
//! length scales, and optional per-vector descriptor strings. All multi-byte
//! fields are big-endian (network order).
//!
//! File layout:
//!
//! ```text
//! [8B unused = -1][4B NDims][4B NVectors][2B NameLen][name UTF-8]
//! [8B MaxLengthScale f64][1B HasDescriptors][NDims x 4B mean][8B Scale f64]
//! then NVectors records of:
//! [NDims x 4B vector][if HasDescriptors: 2B DescLen + DescLen UTF-8 bytes]
//! ```
//!
//! A descriptor length of zero stands for "no descriptor on this vector".

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tracing::info;

use crate::error::{IndexError, Result};
use crate::store::VectorStore;

/// A named, dimension-consistent set of vectors.
#[derive(Debug, Clone)]
pub struct VectorSet {
    name: String,
    dims: usize,
    n: usize,
    data: Vec<f32>,
    mean: Vec<f32>,
    max_length_scale: f64,
    scale: f64,
    descriptors: Option<Vec<Option<String>>>,
}

impl VectorSet {
    /// Build a set from a flat row-major buffer of `n * dims` floats.
    pub fn from_flat(name: &str, dims: usize, data: Vec<f32>) -> Result<Self> {
        if dims == 0 {
            return Err(IndexError::InvalidParameter("dims must be positive".into()));
        }
        if data.len() % dims != 0 {
            return Err(IndexError::InvalidParameter(format!(
                "buffer of {} floats is not a multiple of {} dims",
                data.len(),
                dims
            )));
        }
        Ok(Self::from_parts(name.to_string(), dims, data, None, 1.0, 1.0))
    }

    pub(crate) fn from_parts(
        name: String,
        dims: usize,
        data: Vec<f32>,
        descriptors: Option<Vec<Option<String>>>,
        max_length_scale: f64,
        scale: f64,
    ) -> Self {
        let n = data.len() / dims;
        let mut mean = vec![0.0f64; dims];
        for v in 0..n {
            for (m, x) in mean.iter_mut().zip(&data[v * dims..(v + 1) * dims]) {
                *m += *x as f64;
            }
        }
        let divisor = n.max(1) as f64;
        let mean = mean.iter().map(|m| (m / divisor) as f32).collect();
        VectorSet {
            name,
            dims,
            n,
            data,
            mean,
            max_length_scale,
            scale,
            descriptors,
        }
    }

    /// Mean vector of the set.
    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    /// Descriptor attached to a vector, if the set carries descriptors.
    pub fn descriptor(&self, id: u32) -> Option<&str> {
        self.descriptors
            .as_ref()
            .and_then(|d| d[id as usize].as_deref())
    }

    /// Write the set in the binary vector-set format.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_i64::<BigEndian>(-1)?;
        w.write_u32::<BigEndian>(self.dims as u32)?;
        w.write_u32::<BigEndian>(self.n as u32)?;
        write_short_string(&mut w, &self.name)?;
        w.write_f64::<BigEndian>(self.max_length_scale)?;
        w.write_u8(u8::from(self.descriptors.is_some()))?;
        for m in &self.mean {
            w.write_f32::<BigEndian>(*m)?;
        }
        w.write_f64::<BigEndian>(self.scale)?;
        for v in 0..self.n {
            for x in &self.data[v * self.dims..(v + 1) * self.dims] {
                w.write_f32::<BigEndian>(*x)?;
            }
            if let Some(descriptors) = &self.descriptors {
                match &descriptors[v] {
                    Some(d) => write_short_string(&mut w, d)?,
                    None => w.write_u16::<BigEndian>(0)?,
                }
            }
        }
        w.flush()?;
        info!(name = %self.name, n = self.n, dims = self.dims, "saved vector set");
        Ok(())
    }

    /// Read a set from the binary vector-set format.
    pub fn load(path: &Path) -> Result<Self> {
        let mut r = BufReader::new(File::open(path)?);
        r.read_i64::<BigEndian>()?;
        let dims = r.read_u32::<BigEndian>()? as usize;
        let n = r.read_u32::<BigEndian>()? as usize;
        if dims == 0 {
            return Err(IndexError::Corrupt("vector set has zero dimensions".into()));
        }
        let name = read_short_string(&mut r)?;
        let max_length_scale = r.read_f64::<BigEndian>()?;
        let has_descriptors = r.read_u8()? != 0;
        let mut mean_buf = vec![0.0f32; dims];
        read_f32_into(&mut r, &mut mean_buf)?;
        let scale = r.read_f64::<BigEndian>()?;

        let mut data = vec![0.0f32; n * dims];
        let mut descriptors = has_descriptors.then(|| Vec::with_capacity(n));
        for v in 0..n {
            read_f32_into(&mut r, &mut data[v * dims..(v + 1) * dims])?;
            if let Some(descriptors) = descriptors.as_mut() {
                let d = read_short_string(&mut r)?;
                descriptors.push((!d.is_empty()).then_some(d));
            }
        }
        info!(name = %name, n, dims, "loaded vector set");
        Ok(Self::from_parts(
            name,
            dims,
            data,
            descriptors,
            max_length_scale,
            scale,
        ))
    }
}

impl VectorStore for VectorSet {
    fn dims(&self) -> usize {
        self.dims
    }

    fn len(&self) -> usize {
        self.n
    }

    fn vector(&self, id: u32) -> &[f32] {
        let at = id as usize * self.dims;
        &self.data[at..at + self.dims]
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) fn write_short_string<W: Write>(w: &mut W, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(IndexError::InvalidParameter(format!(
            "string of {} bytes too long for format",
            bytes.len()
        )));
    }
    w.write_u16::<BigEndian>(bytes.len() as u16)?;
    w.write_all(bytes)?;
    Ok(())
}

pub(crate) fn read_short_string<R: Read>(r: &mut R) -> Result<String> {
    let len = r.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| IndexError::Corrupt("string field is not UTF-8".into()))
}

fn read_f32_into<R: Read>(r: &mut R, out: &mut [f32]) -> Result<()> {
    for x in out {
        *x = r.read_f32::<BigEndian>()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> VectorSet {
        VectorSet::from_flat("sample", 3, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
            .unwrap()
    }

    #[test]
    fn flat_access() {
        let set = sample_set();
        assert_eq!(set.len(), 3);
        assert_eq!(set.dims(), 3);
        assert_eq!(set.vector(1), &[3.0, 4.0, 5.0]);
        assert_eq!(set.mean(), &[3.0, 4.0, 5.0]);
    }

    #[test]
    fn rejects_ragged_buffer() {
        assert!(VectorSet::from_flat("bad", 3, vec![1.0; 7]).is_err());
        assert!(VectorSet::from_flat("bad", 0, vec![]).is_err());
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.vec");
        let set = sample_set();
        set.save(&path).unwrap();

        let loaded = VectorSet::load(&path).unwrap();
        assert_eq!(loaded.name(), "sample");
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.dims(), 3);
        for v in 0..3 {
            assert_eq!(loaded.vector(v), set.vector(v));
        }
        assert!(loaded.descriptor(0).is_none());
    }

    #[test]
    fn save_load_with_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desc.vec");
        let set = VectorSet::from_parts(
            "desc".into(),
            2,
            vec![1.0, 2.0, 3.0, 4.0],
            Some(vec![Some("first".into()), None]),
            1.0,
            1.0,
        );
        set.save(&path).unwrap();

        let loaded = VectorSet::load(&path).unwrap();
        assert_eq!(loaded.descriptor(0), Some("first"));
        assert_eq!(loaded.descriptor(1), None);
    }
}
