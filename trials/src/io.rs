//! Binary and text container formats for trial matrices.
//!
//! The binary container stores each axis as a fixed-width identifier table
//! followed by dense row-major payload matrices (`u8` cells for boolean
//! masks, little-endian `f64` for scores); round trips are byte-exact. The
//! text container stores one whitespace-separated line per active trial and
//! round-trips the *set* of trials, re-deriving sorted catalogs on load.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::catalog::IdCatalog;
use crate::key::TrialKey;
use crate::matrix::Mat;
use crate::ndx::TrialNdx;
use crate::scores::TrialScores;
use crate::{TrialsError, TrialsResult};

const MAGIC: &[u8; 4] = b"SVTM";
const VERSION: u16 = 1;

const KIND_NDX: u8 = 1;
const KIND_KEY: u8 = 2;
const KIND_SCORES: u8 = 3;

/// On-disk container format for trial matrices.
///
/// Decided once at the boundary and passed into the format-polymorphic
/// save/load calls on each matrix type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Dense binary container, byte-exact round trips.
    Binary,
    /// Sparse one-trial-per-line text, order-independent round trips.
    Text,
}

impl Format {
    /// Format implied by a file extension: `.txt` selects text, anything
    /// else the binary container.
    pub fn from_path(path: &Path) -> Format {
        match path.extension().and_then(|e| e.to_str()) {
            Some("txt") => Format::Text,
            _ => Format::Binary,
        }
    }
}

fn corrupt(reason: impl Into<String>) -> TrialsError {
    TrialsError::Corrupt {
        reason: reason.into(),
    }
}

// --- binary primitives ---

fn write_header<W: Write>(w: &mut W, kind: u8) -> TrialsResult<()> {
    w.write_all(MAGIC)?;
    w.write_all(&VERSION.to_le_bytes())?;
    w.write_all(&[kind, 0])?;
    Ok(())
}

fn read_header<R: Read>(r: &mut R, want_kind: u8) -> TrialsResult<()> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    let version = u16::from_le_bytes(buf);
    if version != VERSION {
        return Err(corrupt(format!("unsupported container version {version}")));
    }
    r.read_exact(&mut buf)?;
    if buf[0] != want_kind {
        return Err(corrupt(format!(
            "container holds kind {}, expected kind {want_kind}",
            buf[0]
        )));
    }
    Ok(())
}

fn write_id_table<W: Write>(w: &mut W, ids: &[String]) -> TrialsResult<()> {
    let width = ids.iter().map(|s| s.len()).max().unwrap_or(0).max(1);
    w.write_all(&(ids.len() as u64).to_le_bytes())?;
    w.write_all(&(width as u32).to_le_bytes())?;
    let mut cell = vec![0u8; width];
    for id in ids {
        cell.fill(0);
        cell[..id.len()].copy_from_slice(id.as_bytes());
        w.write_all(&cell)?;
    }
    Ok(())
}

fn read_id_table<R: Read>(r: &mut R) -> TrialsResult<IdCatalog> {
    let mut n = [0u8; 8];
    r.read_exact(&mut n)?;
    let count = u64::from_le_bytes(n) as usize;
    let mut wbuf = [0u8; 4];
    r.read_exact(&mut wbuf)?;
    let width = u32::from_le_bytes(wbuf) as usize;
    if width == 0 {
        return Err(corrupt("zero identifier width"));
    }

    let mut ids = Vec::with_capacity(count);
    let mut cell = vec![0u8; width];
    for _ in 0..count {
        r.read_exact(&mut cell)?;
        let end = cell.iter().position(|&b| b == 0).unwrap_or(width);
        let id = std::str::from_utf8(&cell[..end])
            .map_err(|_| corrupt("identifier is not valid UTF-8"))?;
        ids.push(id.to_string());
    }
    IdCatalog::new(ids)
}

fn write_mask<W: Write>(w: &mut W, mask: &Mat<bool>) -> TrialsResult<()> {
    let bytes: Vec<u8> = mask.as_slice().iter().map(|&v| v as u8).collect();
    w.write_all(&bytes)?;
    Ok(())
}

fn read_mask<R: Read>(r: &mut R, rows: usize, cols: usize) -> TrialsResult<Mat<bool>> {
    let mut bytes = vec![0u8; rows * cols];
    r.read_exact(&mut bytes)?;
    let cells = bytes.iter().map(|&b| b != 0).collect();
    Ok(Mat::from_vec(rows, cols, cells).expect("cell count matches shape"))
}

fn write_f64s<W: Write>(w: &mut W, m: &Mat<f64>) -> TrialsResult<()> {
    for v in m.as_slice() {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn read_f64s<R: Read>(r: &mut R, rows: usize, cols: usize) -> TrialsResult<Mat<f64>> {
    let mut cells = Vec::with_capacity(rows * cols);
    let mut buf = [0u8; 8];
    for _ in 0..rows * cols {
        r.read_exact(&mut buf)?;
        cells.push(f64::from_le_bytes(buf));
    }
    Ok(Mat::from_vec(rows, cols, cells).expect("cell count matches shape"))
}

// --- text primitives ---

/// Sorted catalog over the unique identifiers encountered in a text file.
fn unique_catalog<'a, I>(ids: I) -> TrialsResult<IdCatalog>
where
    I: IntoIterator<Item = &'a str>,
{
    let set: BTreeSet<&str> = ids.into_iter().collect();
    IdCatalog::new(set)
}

fn split_line(line: &str, lineno: usize, want: usize) -> TrialsResult<Vec<&str>> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != want {
        return Err(TrialsError::Parse {
            line: lineno,
            reason: format!("expected {want} fields, got {}", fields.len()),
        });
    }
    Ok(fields)
}

// --- per-type save/load ---

pub(crate) fn save_ndx(ndx: &TrialNdx, path: &Path, format: Format) -> TrialsResult<()> {
    let mut w = BufWriter::new(File::create(path)?);
    match format {
        Format::Binary => {
            write_header(&mut w, KIND_NDX)?;
            write_id_table(&mut w, ndx.model_set().ids())?;
            write_id_table(&mut w, ndx.seg_set().ids())?;
            write_mask(&mut w, ndx.trial_mask())?;
        }
        Format::Text => {
            for (i, model) in ndx.model_set().ids().iter().enumerate() {
                for (j, seg) in ndx.seg_set().ids().iter().enumerate() {
                    if ndx.trial_mask()[(i, j)] {
                        writeln!(w, "{model} {seg}")?;
                    }
                }
            }
        }
    }
    w.flush()?;
    Ok(())
}

pub(crate) fn load_ndx(path: &Path, format: Format) -> TrialsResult<TrialNdx> {
    match format {
        Format::Binary => {
            let mut r = BufReader::new(File::open(path)?);
            read_header(&mut r, KIND_NDX)?;
            let model_set = read_id_table(&mut r)?;
            let seg_set = read_id_table(&mut r)?;
            let mask = read_mask(&mut r, model_set.len(), seg_set.len())?;
            TrialNdx::new(model_set, seg_set, mask)
        }
        Format::Text => {
            let r = BufReader::new(File::open(path)?);
            let mut records = Vec::new();
            for (i, line) in r.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let fields = split_line(&line, i + 1, 2)?;
                records.push((fields[0].to_string(), fields[1].to_string()));
            }
            let model_set = unique_catalog(records.iter().map(|r| r.0.as_str()))?;
            let seg_set = unique_catalog(records.iter().map(|r| r.1.as_str()))?;
            let mut mask = Mat::zeros(model_set.len(), seg_set.len());
            for (m, s) in &records {
                let i = model_set.position(m).expect("model was just collected");
                let j = seg_set.position(s).expect("segment was just collected");
                mask[(i, j)] = true;
            }
            TrialNdx::new(model_set, seg_set, mask)
        }
    }
}

pub(crate) fn save_key(key: &TrialKey, path: &Path, format: Format) -> TrialsResult<()> {
    let mut w = BufWriter::new(File::create(path)?);
    match format {
        Format::Binary => {
            write_header(&mut w, KIND_KEY)?;
            write_id_table(&mut w, key.model_set().ids())?;
            write_id_table(&mut w, key.seg_set().ids())?;
            write_mask(&mut w, key.tar())?;
            write_mask(&mut w, key.non())?;
        }
        Format::Text => {
            for (i, model) in key.model_set().ids().iter().enumerate() {
                for (j, seg) in key.seg_set().ids().iter().enumerate() {
                    if key.tar()[(i, j)] {
                        writeln!(w, "{model} {seg} target")?;
                    } else if key.non()[(i, j)] {
                        writeln!(w, "{model} {seg} nontarget")?;
                    }
                }
            }
        }
    }
    w.flush()?;
    Ok(())
}

pub(crate) fn load_key(path: &Path, format: Format) -> TrialsResult<TrialKey> {
    match format {
        Format::Binary => {
            let mut r = BufReader::new(File::open(path)?);
            read_header(&mut r, KIND_KEY)?;
            let model_set = read_id_table(&mut r)?;
            let seg_set = read_id_table(&mut r)?;
            let tar = read_mask(&mut r, model_set.len(), seg_set.len())?;
            let non = read_mask(&mut r, model_set.len(), seg_set.len())?;
            TrialKey::new(model_set, seg_set, tar, non)
        }
        Format::Text => {
            let r = BufReader::new(File::open(path)?);
            let mut records = Vec::new();
            for (i, line) in r.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let fields = split_line(&line, i + 1, 3)?;
                let is_tar = match fields[2] {
                    "target" => true,
                    "nontarget" => false,
                    other => {
                        return Err(TrialsError::Parse {
                            line: i + 1,
                            reason: format!("unknown trial label: {other}"),
                        });
                    }
                };
                records.push((fields[0].to_string(), fields[1].to_string(), is_tar));
            }
            let model_set = unique_catalog(records.iter().map(|r| r.0.as_str()))?;
            let seg_set = unique_catalog(records.iter().map(|r| r.1.as_str()))?;
            let mut tar = Mat::zeros(model_set.len(), seg_set.len());
            let mut non = Mat::zeros(model_set.len(), seg_set.len());
            for (m, s, is_tar) in &records {
                let i = model_set.position(m).expect("model was just collected");
                let j = seg_set.position(s).expect("segment was just collected");
                if *is_tar {
                    tar[(i, j)] = true;
                } else {
                    non[(i, j)] = true;
                }
            }
            TrialKey::new(model_set, seg_set, tar, non)
        }
    }
}

pub(crate) fn save_scores(scr: &TrialScores, path: &Path, format: Format) -> TrialsResult<()> {
    let mut w = BufWriter::new(File::create(path)?);
    match format {
        Format::Binary => {
            write_header(&mut w, KIND_SCORES)?;
            write_id_table(&mut w, scr.model_set().ids())?;
            write_id_table(&mut w, scr.seg_set().ids())?;
            write_f64s(&mut w, scr.scores())?;
            write_mask(&mut w, scr.score_mask())?;
        }
        Format::Text => {
            for (i, model) in scr.model_set().ids().iter().enumerate() {
                for (j, seg) in scr.seg_set().ids().iter().enumerate() {
                    if scr.score_mask()[(i, j)] {
                        writeln!(w, "{model} {seg} {}", scr.scores()[(i, j)])?;
                    }
                }
            }
        }
    }
    w.flush()?;
    Ok(())
}

pub(crate) fn load_scores(path: &Path, format: Format) -> TrialsResult<TrialScores> {
    match format {
        Format::Binary => {
            let mut r = BufReader::new(File::open(path)?);
            read_header(&mut r, KIND_SCORES)?;
            let model_set = read_id_table(&mut r)?;
            let seg_set = read_id_table(&mut r)?;
            let scores = read_f64s(&mut r, model_set.len(), seg_set.len())?;
            let mask = read_mask(&mut r, model_set.len(), seg_set.len())?;
            TrialScores::new(model_set, seg_set, scores, mask)
        }
        Format::Text => {
            let r = BufReader::new(File::open(path)?);
            let mut records = Vec::new();
            for (i, line) in r.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let fields = split_line(&line, i + 1, 3)?;
                let value: f64 = fields[2].parse().map_err(|_| TrialsError::Parse {
                    line: i + 1,
                    reason: format!("bad score value: {}", fields[2]),
                })?;
                records.push((fields[0].to_string(), fields[1].to_string(), value));
            }
            let model_set = unique_catalog(records.iter().map(|r| r.0.as_str()))?;
            let seg_set = unique_catalog(records.iter().map(|r| r.1.as_str()))?;
            let mut scores = Mat::zeros(model_set.len(), seg_set.len());
            let mut mask = Mat::zeros(model_set.len(), seg_set.len());
            for (m, s, v) in &records {
                let i = model_set.position(m).expect("model was just collected");
                let j = seg_set.position(s).expect("segment was just collected");
                scores[(i, j)] = *v;
                mask[(i, j)] = true;
            }
            TrialScores::new(model_set, seg_set, scores, mask)
        }
    }
}
