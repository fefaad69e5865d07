use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::debug;

use crate::error::StoreError;

const ATTRIBUTES_FILE: &str = "attributes.json";
const DATA_FILE: &str = "data.bin";
const N5_VERSION_KEY: &str = "n5";
const N5_VERSION: &str = "2.0.0";

const DTYPE_UINT64: &str = "uint64";
const DTYPE_FLOAT64: &str = "float64";

/// Filesystem-backed N5-style container.
///
/// Groups and datasets are directories under the container root; every node
/// carries an `attributes.json`. Dataset directories additionally hold a flat
/// little-endian `data.bin` described by the `dimensions` and `dataType`
/// attributes.
#[derive(Debug, Clone)]
pub struct N5Container {
    root: PathBuf,
}

impl N5Container {
    /// Open an existing container. Fails if the root attributes file is missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.join(ATTRIBUTES_FILE).is_file() {
            return Err(StoreError::NotAContainer(root.display().to_string()));
        }
        Ok(Self { root })
    }

    /// Create a new container (or open it if the root attributes already exist).
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let attrs_path = root.join(ATTRIBUTES_FILE);
        if !attrs_path.is_file() {
            write_json(&attrs_path, &json!({ N5_VERSION_KEY: N5_VERSION }))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn node_path(&self, name: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in name.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    pub fn exists(&self, name: &str) -> bool {
        self.node_path(name).join(ATTRIBUTES_FILE).is_file()
    }

    /// Create a group node (directory with empty attributes).
    pub fn create_group(&self, name: &str) -> Result<(), StoreError> {
        let path = self.node_path(name);
        fs::create_dir_all(&path)?;
        let attrs_path = path.join(ATTRIBUTES_FILE);
        if !attrs_path.is_file() {
            write_json(&attrs_path, &json!({}))?;
        }
        Ok(())
    }

    /// Read the attributes of a group or dataset.
    pub fn read_attributes(&self, name: &str) -> Result<Value, StoreError> {
        let attrs_path = self.node_path(name).join(ATTRIBUTES_FILE);
        if !attrs_path.is_file() {
            return Err(StoreError::DatasetNotFound(name.to_string()));
        }
        let text = fs::read_to_string(attrs_path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Merge `key: value` into the attributes of an existing node.
    pub fn set_attribute(&self, name: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let mut attrs = self.read_attributes(name)?;
        attrs[key] = value;
        write_json(&self.node_path(name).join(ATTRIBUTES_FILE), &attrs)?;
        Ok(())
    }

    /// Write a uint64 dataset with the given dimensions (row-major).
    pub fn write_uint64(
        &self,
        name: &str,
        data: &[u64],
        dimensions: &[usize],
    ) -> Result<(), StoreError> {
        self.check_len(name, data.len(), dimensions)?;
        let mut bytes = Vec::with_capacity(data.len() * 8);
        for v in data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        self.write_dataset(name, DTYPE_UINT64, &bytes, dimensions)
    }

    /// Write a float64 dataset with the given dimensions (row-major).
    pub fn write_float64(
        &self,
        name: &str,
        data: &[f64],
        dimensions: &[usize],
    ) -> Result<(), StoreError> {
        self.check_len(name, data.len(), dimensions)?;
        let mut bytes = Vec::with_capacity(data.len() * 8);
        for v in data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        self.write_dataset(name, DTYPE_FLOAT64, &bytes, dimensions)
    }

    /// Read a uint64 dataset, returning its values and dimensions.
    pub fn read_uint64(&self, name: &str) -> Result<(Vec<u64>, Vec<usize>), StoreError> {
        let (bytes, dimensions) = self.read_dataset(name, DTYPE_UINT64)?;
        let values = bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().expect("chunks_exact(8)")))
            .collect();
        Ok((values, dimensions))
    }

    /// Read a float64 dataset, returning its values and dimensions.
    pub fn read_float64(&self, name: &str) -> Result<(Vec<f64>, Vec<usize>), StoreError> {
        let (bytes, dimensions) = self.read_dataset(name, DTYPE_FLOAT64)?;
        let values = bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().expect("chunks_exact(8)")))
            .collect();
        Ok((values, dimensions))
    }

    fn check_len(&self, name: &str, len: usize, dimensions: &[usize]) -> Result<(), StoreError> {
        let expected: usize = dimensions.iter().product();
        if len != expected {
            return Err(StoreError::ShapeMismatch {
                dataset: name.to_string(),
                detail: format!("{} values for dimensions {:?}", len, dimensions),
            });
        }
        Ok(())
    }

    fn write_dataset(
        &self,
        name: &str,
        data_type: &'static str,
        bytes: &[u8],
        dimensions: &[usize],
    ) -> Result<(), StoreError> {
        let path = self.node_path(name);
        fs::create_dir_all(&path)?;
        write_json(
            &path.join(ATTRIBUTES_FILE),
            &json!({ "dimensions": dimensions, "dataType": data_type }),
        )?;
        fs::write(path.join(DATA_FILE), bytes)?;
        debug!(dataset = name, ?dimensions, data_type, "wrote dataset");
        Ok(())
    }

    fn read_dataset(
        &self,
        name: &str,
        expected_type: &'static str,
    ) -> Result<(Vec<u8>, Vec<usize>), StoreError> {
        let attrs = self.read_attributes(name)?;

        let actual = attrs
            .get("dataType")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if actual != expected_type {
            return Err(StoreError::DataTypeMismatch {
                dataset: name.to_string(),
                expected: expected_type,
                actual,
            });
        }

        let dimensions: Vec<usize> = attrs
            .get("dimensions")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .map(|v| v.as_u64().unwrap_or(0) as usize)
                    .collect()
            })
            .ok_or_else(|| StoreError::ShapeMismatch {
                dataset: name.to_string(),
                detail: "missing dimensions attribute".to_string(),
            })?;

        let bytes = fs::read(self.node_path(name).join(DATA_FILE))?;
        let expected_len: usize = dimensions.iter().product::<usize>() * 8;
        if bytes.len() != expected_len {
            return Err(StoreError::ShapeMismatch {
                dataset: name.to_string(),
                detail: format!(
                    "{} data bytes for dimensions {:?}",
                    bytes.len(),
                    dimensions
                ),
            });
        }
        Ok((bytes, dimensions))
    }
}

fn write_json(path: &Path, value: &Value) -> Result<(), StoreError> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            N5Container::open(dir.path()),
            Err(StoreError::NotAContainer(_))
        ));
        N5Container::create(dir.path()).unwrap();
        assert!(N5Container::open(dir.path()).is_ok());
    }

    #[test]
    fn uint64_dataset_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let c = N5Container::create(dir.path()).unwrap();
        c.write_uint64("group/edges", &[0, 1, 1, 2, 0, 2], &[3, 2])
            .unwrap();

        let (values, dims) = c.read_uint64("group/edges").unwrap();
        assert_eq!(values, vec![0, 1, 1, 2, 0, 2]);
        assert_eq!(dims, vec![3, 2]);
    }

    #[test]
    fn float64_dataset_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let c = N5Container::create(dir.path()).unwrap();
        c.write_float64("f", &[0.5, 1.0, 0.25, 0.75], &[2, 2]).unwrap();

        let (values, dims) = c.read_float64("f").unwrap();
        assert_eq!(values, vec![0.5, 1.0, 0.25, 0.75]);
        assert_eq!(dims, vec![2, 2]);
    }

    #[test]
    fn read_with_wrong_type_fails() {
        let dir = tempfile::tempdir().unwrap();
        let c = N5Container::create(dir.path()).unwrap();
        c.write_uint64("d", &[1, 2], &[2]).unwrap();

        assert!(matches!(
            c.read_float64("d"),
            Err(StoreError::DataTypeMismatch { .. })
        ));
    }

    #[test]
    fn shape_must_match_data_length() {
        let dir = tempfile::tempdir().unwrap();
        let c = N5Container::create(dir.path()).unwrap();
        assert!(matches!(
            c.write_uint64("d", &[1, 2, 3], &[2, 2]),
            Err(StoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn attributes_merge() {
        let dir = tempfile::tempdir().unwrap();
        let c = N5Container::create(dir.path()).unwrap();
        c.create_group("ds").unwrap();
        c.set_attribute("ds", "painteraData", serde_json::json!({ "type": "label" }))
            .unwrap();

        let attrs = c.read_attributes("ds").unwrap();
        assert_eq!(attrs["painteraData"]["type"], "label");
    }
}
