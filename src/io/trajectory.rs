//! Trajectory export and import in the KITTI pose format.
//!
//! One line per frame, the 12 values of the row-major 3x4 block `[R | t]` of
//! `robot_to_world`, each followed by a single space.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, Trim};
use tracing::{info, warn};

use crate::geometry::SE3;
use crate::map::WorldMap;

/// Write the poses of all frames in identifier order.
///
/// Without a path, `trajectory-<unix seconds>.txt` is written to the working
/// directory. An existing file is overwritten. Returns the path written.
pub fn write_trajectory(map: &WorldMap, path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let seconds = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .context("System clock is before the unix epoch")?
                .as_secs();
            PathBuf::from(format!("trajectory-{}.txt", seconds))
        }
    };

    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for frame in map.frames() {
        let block = frame.robot_to_world().to_matrix_3x4();
        for row in 0..3 {
            for col in 0..4 {
                write!(writer, "{} ", block[(row, col)])
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }
        writeln!(writer).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Saved trajectory of {} frames to {}", map.num_frames(), path.display());
    Ok(path)
}

/// Read poses written by [`write_trajectory`] (or a KITTI ground truth file).
pub fn read_trajectory<P: AsRef<Path>>(path: P) -> Result<Vec<SE3>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut poses = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let fields: Vec<&str> = rec.iter().filter(|field| !field.is_empty()).collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() != 12 {
            bail!(
                "{}:{}: expected 12 values, found {}",
                path.display(),
                line + 1,
                fields.len()
            );
        }

        let mut values = [0.0; 12];
        for (value, field) in values.iter_mut().zip(&fields) {
            *value = field
                .parse()
                .with_context(|| format!("{}:{}: invalid number {:?}", path.display(), line + 1, field))?;
        }
        poses.push(SE3::from_row_major_3x4(&values));
    }

    if poses.is_empty() {
        warn!("No poses found in {}", path.display());
    }
    Ok(poses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    fn sample_poses() -> Vec<SE3> {
        vec![
            SE3::identity(),
            SE3::from_translation(Vector3::new(1.5, -0.25, 3.0)),
            SE3::new(
                UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5),
                Vector3::new(2.0, 1.0, 0.0),
            ),
        ]
    }

    #[test]
    fn test_export_three_frames() {
        let mut map = WorldMap::new();
        let poses = sample_poses();
        for pose in &poses {
            map.create_frame(*pose, 5.0);
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectory.txt");
        let written = write_trajectory(&map, Some(&path)).unwrap();
        assert_eq!(written, path);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(contents.ends_with(" \n"));

        for (line, pose) in lines.iter().zip(&poses) {
            let values: Vec<f64> = line.split_whitespace().map(|v| v.parse().unwrap()).collect();
            assert_eq!(values.len(), 12);

            let block = pose.to_matrix_3x4();
            for row in 0..3 {
                for col in 0..4 {
                    assert_relative_eq!(values[row * 4 + col], block[(row, col)], epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_first_line_of_identity() {
        let mut map = WorldMap::new();
        map.create_frame(SE3::identity(), 5.0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.txt");
        write_trajectory(&map, Some(&path)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "1 0 0 0 0 1 0 0 0 0 1 0 \n");
    }

    #[test]
    fn test_export_overwrites_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectory.txt");
        std::fs::write(&path, "stale contents\nmore\nlines\nhere\n").unwrap();

        let mut map = WorldMap::new();
        for pose in sample_poses() {
            map.create_frame(pose, 5.0);
        }
        write_trajectory(&map, Some(&path)).unwrap();

        let poses = read_trajectory(&path).unwrap();
        assert_eq!(poses.len(), 3);
        for (read, expected) in poses.iter().zip(sample_poses()) {
            assert_relative_eq!(read.to_matrix(), expected.to_matrix(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_read_rejects_short_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.txt");
        std::fs::write(&path, "1 0 0 0 0 1 0 0 0 0 1\n").unwrap();

        assert!(read_trajectory(&path).is_err());
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("trajectory.txt");

        assert!(write_trajectory(&WorldMap::new(), Some(&path)).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_error_names_the_file() {
        // More lines than the writer buffers, so the failure hits a write
        let mut map = WorldMap::new();
        for i in 0..1000 {
            map.create_frame(SE3::from_translation(Vector3::new(i as f64 * 0.1, 0.0, 0.0)), 5.0);
        }

        let err = write_trajectory(&map, Some(Path::new("/dev/full"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to write /dev/full"));
    }
}
