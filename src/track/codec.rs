//! Praat `Intensity 2` text format reader and writer

use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use super::IntensityTrack;
use crate::error::{NasalanceError, Result};

/// Missing-value token used by Praat.
pub const UNDEFINED_TOKEN: &str = "--undefined--";

const HEADER: [&str; 3] = ["File type = \"ooTextFile\"", "Object class = \"Intensity 2\"", ""];
const SAMPLE_PREFIX: &str = "z [1] [";

#[derive(Debug, Default)]
struct Header {
    xmax: Option<f64>,
    nx: Option<usize>,
    dx: Option<f64>,
    x1: Option<f64>,
    assignments: usize,
}

pub struct IntensityCodec;

impl IntensityCodec {
    /// Read and parse an intensity file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<IntensityTrack> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => NasalanceError::file_not_found(path),
            std::io::ErrorKind::InvalidData => NasalanceError::malformed(path, "content is not UTF-8 text"),
            _ => NasalanceError::io(format!("Cannot read {}: {}", path.display(), e)),
        })?;
        Self::parse(&content, path)
    }

    /// Parse file content; `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<IntensityTrack> {
        let mut header = Header::default();
        let mut samples: Vec<(usize, Option<f64>)> = Vec::new();

        for (line_no, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if let Some(rest) = line.strip_prefix(SAMPLE_PREFIX) {
                let (index, value) = parse_sample(rest)
                    .ok_or_else(|| NasalanceError::malformed(origin, format!("bad sample line {}: {:?}", line_no + 1, raw)))?;
                samples.push((index, value));
                continue;
            }

            let Some((key, value)) = line.split_once('=') else { continue };
            let value = value.trim();
            let bad = || NasalanceError::malformed(origin, format!("bad value on line {}: {:?}", line_no + 1, raw));
            match key.trim() {
                "xmax" => header.xmax = Some(value.parse().map_err(|_| bad())?),
                "nx" => header.nx = Some(value.parse().map_err(|_| bad())?),
                "dx" => header.dx = Some(value.parse().map_err(|_| bad())?),
                "x1" => header.x1 = Some(value.parse().map_err(|_| bad())?),
                "xmin" | "ymin" | "ymax" | "ny" | "dy" | "y1" => {}
                "Object class" if !value.contains("Intensity") => {
                    return Err(NasalanceError::malformed(origin, format!("not an intensity object: {}", value)));
                }
                _ => continue,
            }
            header.assignments += 1;
        }

        if header.assignments == 0 {
            return Err(NasalanceError::malformed(origin, "no header assignment lines found"));
        }
        let missing = |key: &str| NasalanceError::malformed(origin, format!("missing `{}` assignment", key));
        let nx = header.nx.ok_or_else(|| missing("nx"))?;
        let dx = header.dx.ok_or_else(|| missing("dx"))?;
        let x1 = header.x1.ok_or_else(|| missing("x1"))?;
        let xmax = header.xmax.ok_or_else(|| missing("xmax"))?;

        if samples.len() != nx {
            return Err(NasalanceError::malformed(
                origin,
                format!("header declares nx = {} but {} sample lines found", nx, samples.len()),
            ));
        }

        let mut values = vec![None; nx];
        let mut seen = vec![false; nx];
        for (index, value) in samples {
            if index == 0 || index > nx || seen[index - 1] {
                return Err(NasalanceError::malformed(origin, format!("sample index {} out of order", index)));
            }
            seen[index - 1] = true;
            values[index - 1] = value;
        }

        Ok(IntensityTrack::new(x1, dx, xmax, values))
    }

    /// Render the full file text. Every line after the three header lines
    /// ends with a single space, which Praat expects.
    pub fn render(track: &IntensityTrack) -> String {
        let mut out = String::with_capacity(256 + track.nx() * 32);
        for line in HEADER {
            out.push_str(line);
            out.push('\n');
        }
        let _ = writeln!(out, "xmin = 0 ");
        let _ = writeln!(out, "xmax = {} ", track.xmax);
        let _ = writeln!(out, "nx = {} ", track.nx());
        let _ = writeln!(out, "dx = {} ", track.dx);
        let _ = writeln!(out, "x1 = {} ", track.x1);
        for dummy in ["ymin", "ymax", "ny", "dy", "y1"] {
            let _ = writeln!(out, "{} = 1 ", dummy);
        }
        out.push_str("z [] []: \n");
        out.push_str("    z [1]: \n");
        for (i, value) in track.values.iter().enumerate() {
            let _ = match value {
                Some(v) if v.is_finite() => writeln!(out, "        z [1] [{}] = {} ", i + 1, v),
                _ => writeln!(out, "        z [1] [{}] = {} ", i + 1, UNDEFINED_TOKEN),
            };
        }
        out
    }

    /// Write `track` to `path`. The text goes to a temporary file in the
    /// target directory first and is then moved into place, so a failed
    /// write never leaves a partial file behind.
    pub fn write<P: AsRef<Path>>(track: &IntensityTrack, path: P, overwrite: bool) -> Result<()> {
        let path = path.as_ref();
        if !overwrite && path.exists() {
            return Err(NasalanceError::file_exists(path));
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .map_err(|e| NasalanceError::io(format!("Cannot create output directory {}: {}", dir.display(), e)))?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(Self::render(track).as_bytes())?;
        tmp.flush()?;

        if overwrite {
            tmp.persist(path)
                .map_err(|e| NasalanceError::io(format!("Cannot finalize {}: {}", path.display(), e.error)))?;
        } else {
            tmp.persist_noclobber(path).map_err(|e| match e.error.kind() {
                std::io::ErrorKind::AlreadyExists => NasalanceError::file_exists(path),
                _ => NasalanceError::io(format!("Cannot finalize {}: {}", path.display(), e.error)),
            })?;
        }
        log::debug!("Wrote {} ({} samples)", path.display(), track.nx());
        Ok(())
    }
}

/// `rest` is whatever follows `z [1] [`, e.g. `12] = 54.3`.
fn parse_sample(rest: &str) -> Option<(usize, Option<f64>)> {
    let (index, tail) = rest.split_once(']')?;
    let index: usize = index.trim().parse().ok()?;
    let (_, value) = tail.split_once('=')?;
    let value = value.trim();
    if value == UNDEFINED_TOKEN {
        return Some((index, None));
    }
    value.parse::<f64>().ok().map(|v| (index, Some(v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::TempDir;

    fn sample_track() -> IntensityTrack {
        IntensityTrack::new(0.01, 0.01, 0.05, vec![Some(1.0), None, Some(2.0)])
    }

    #[test]
    fn test_render_layout() {
        let text = IntensityCodec::render(&sample_track());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "File type = \"ooTextFile\"");
        assert_eq!(lines[1], "Object class = \"Intensity 2\"");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "xmin = 0 ");
        assert_eq!(lines[4], "xmax = 0.05 ");
        assert_eq!(lines[5], "nx = 3 ");
        assert_eq!(lines[6], "dx = 0.01 ");
        assert_eq!(lines[7], "x1 = 0.01 ");
        assert_eq!(lines[8], "ymin = 1 ");
        assert_eq!(lines[12], "y1 = 1 ");
        assert_eq!(lines[16], "        z [1] [2] = --undefined-- ");
        assert!(lines[3..].iter().all(|l| l.ends_with(' ')));
    }

    #[test]
    fn test_scenario_roundtrip_with_undefined() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a_ch1.Intensity");
        IntensityCodec::write(&sample_track(), &path, true).unwrap();

        let track = IntensityCodec::read(&path).unwrap();
        let times: Vec<f64> = track.points().map(|p| p.time).collect();
        for (t, expected) in times.iter().zip([0.01, 0.02, 0.03]) {
            assert!((t - expected).abs() < 1e-12);
        }
        assert_eq!(track.values, vec![Some(1.0), None, Some(2.0)]);
        assert_eq!(track.xmax, 0.05);
    }

    #[test]
    fn test_random_tracks_roundtrip() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let nx = rng.gen_range(1..200);
            let values = (0..nx)
                .map(|_| if rng.gen_bool(0.2) { None } else { Some(rng.gen_range(-20.0..95.0)) })
                .collect();
            let track = IntensityTrack::new(rng.gen_range(0.0..0.05), 0.00625, rng.gen_range(1.0..9.0), values);
            let parsed = IntensityCodec::parse(&IntensityCodec::render(&track), Path::new("mem")).unwrap();
            assert_eq!(parsed, track);
        }
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let text = "File type = \"ooTextFile\"\nObject class = \"Intensity 2\"\n\n\
                    xmin   =  0\n  xmax= 1.5\nnx =2\n dx = 0.5\nx1 = 0.25\n\
                    z [] []:\n    z [1]:\n  z [1] [1] =  60.5\n\tz [1] [2] = --undefined--\n";
        let track = IntensityCodec::parse(text, Path::new("mem")).unwrap();
        assert_eq!(track.x1, 0.25);
        assert_eq!(track.values, vec![Some(60.5), None]);
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(
            IntensityCodec::parse("nothing here\n", Path::new("mem")),
            Err(NasalanceError::MalformedTrack { .. })
        ));

        let short = "xmin = 0 \nxmax = 1 \nnx = 3 \ndx = 0.1 \nx1 = 0.05 \n        z [1] [1] = 1 \n";
        assert!(matches!(
            IntensityCodec::parse(short, Path::new("mem")),
            Err(NasalanceError::MalformedTrack { .. })
        ));

        let dir = TempDir::new().unwrap();
        let utf16 = dir.path().join("utf16.Intensity");
        std::fs::write(&utf16, [0xFF, 0xFE, b'x', 0x00, b'm', 0x00]).unwrap();
        assert!(matches!(
            IntensityCodec::read(&utf16),
            Err(NasalanceError::MalformedTrack { .. })
        ));

        assert!(matches!(
            IntensityCodec::read("/definitely/not/here.Intensity"),
            Err(NasalanceError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_write_respects_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.Intensity");
        IntensityCodec::write(&sample_track(), &path, false).unwrap();

        let err = IntensityCodec::write(&sample_track(), &path, false).unwrap_err();
        assert!(matches!(err, NasalanceError::FileExists { .. }));

        let replacement = IntensityTrack::new(0.0, 0.5, 1.0, vec![Some(9.0)]);
        IntensityCodec::write(&replacement, &path, true).unwrap();
        assert_eq!(IntensityCodec::read(&path).unwrap(), replacement);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
