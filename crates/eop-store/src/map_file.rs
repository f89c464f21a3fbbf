//! Named-object map file.
//!
//! A map file is a JSON document holding named channel maps and weight tables,
//! much like a ROOT file holding `TH2D` objects. Files are read whole, edited in
//! memory, and written back atomically, so objects that were not touched survive
//! an update unchanged.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use eop_calib::EopWeightTable;
use eop_core::{
    CalibrationMap, ChannelGrid, Error, MapStore, PartialMap, Result, SumMap, WriteMode,
};
use serde::{Deserialize, Serialize};

/// Format tag written into every map file.
pub const MAP_FILE_FORMAT: &str = "eopic_maps_v1";

/// Stored channel map. `null` values mark undefined channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMap {
    /// Free-form title.
    #[serde(default)]
    pub title: String,
    /// Grid the values are laid out on.
    pub grid: ChannelGrid,
    /// Values in linear channel order.
    pub values: Vec<Option<f64>>,
}

/// Any object a map file can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredObject {
    /// Channel-indexed map.
    ChannelMap(StoredMap),
    /// Binned E/p weight table.
    EopWeight(EopWeightTable),
}

impl StoredObject {
    /// Short class name, used in listings.
    pub fn kind(&self) -> &'static str {
        match self {
            StoredObject::ChannelMap(_) => "channel_map",
            StoredObject::EopWeight(_) => "eop_weight",
        }
    }
}

/// Name and kind of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Object name.
    pub name: String,
    /// Object kind (`channel_map` or `eop_weight`).
    pub kind: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Document {
    format: String,
    #[serde(default)]
    meta: BTreeMap<String, String>,
    #[serde(default)]
    objects: BTreeMap<String, StoredObject>,
}

impl Document {
    fn empty() -> Self {
        Self { format: MAP_FILE_FORMAT.to_string(), meta: BTreeMap::new(), objects: BTreeMap::new() }
    }
}

/// A map file opened for reading and (optionally) writing.
#[derive(Debug, Clone)]
pub struct MapFile {
    path: PathBuf,
    doc: Document,
}

impl MapFile {
    /// Start an empty file at `path`, discarding any existing content on [`MapFile::save`].
    pub fn create(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), doc: Document::empty() }
    }

    /// Open an existing file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))
        })?;
        let doc: Document = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::Validation(format!("{}: not a map file: {e}", path.display()))
        })?;
        if doc.format != MAP_FILE_FORMAT {
            return Err(Error::Validation(format!(
                "{}: unsupported map file format '{}' (expected '{MAP_FILE_FORMAT}')",
                path.display(),
                doc.format
            )));
        }
        tracing::debug!(path = %path.display(), objects = doc.objects.len(), "opened map file");
        Ok(Self { path: path.to_path_buf(), doc })
    }

    /// Open `path` if it exists, otherwise start an empty file there.
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() { Self::open(path) } else { Ok(Self::create(path)) }
    }

    /// File location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All objects, sorted by name.
    pub fn list_keys(&self) -> Vec<KeyInfo> {
        self.doc
            .objects
            .iter()
            .map(|(name, obj)| KeyInfo { name: name.clone(), kind: obj.kind() })
            .collect()
    }

    /// Borrow a stored object.
    pub fn get_object(&self, name: &str) -> Result<&StoredObject> {
        self.doc.objects.get(name).ok_or_else(|| {
            Error::Validation(format!("object '{name}' not found in {}", self.path.display()))
        })
    }

    /// Load a channel map.
    pub fn get_map(&self, name: &str) -> Result<PartialMap> {
        match self.get_object(name)? {
            StoredObject::ChannelMap(m) => PartialMap::from_values(m.grid, m.values.clone()),
            other => Err(self.wrong_kind(name, other, "channel_map")),
        }
    }

    /// Load a channel map that must be defined everywhere (numerator, denominator).
    pub fn get_sums(&self, name: &str) -> Result<SumMap> {
        self.get_map(name)?.require_dense(name)
    }

    /// Load a calibration map. Undefined channels default to 1.0.
    pub fn get_calibration(&self, name: &str) -> Result<CalibrationMap> {
        let map = self.get_map(name)?.map(|v| v.unwrap_or(1.0));
        CalibrationMap::new(map)
            .map_err(|e| Error::Validation(format!("{}/{name}: {e}", self.path.display())))
    }

    /// Load a weight table. Unnamed tables take the object name.
    pub fn get_weight_table(&self, name: &str) -> Result<EopWeightTable> {
        match self.get_object(name)? {
            StoredObject::EopWeight(t) if t.name().is_empty() => Ok(t.clone().with_name(name)),
            StoredObject::EopWeight(t) => Ok(t.clone()),
            other => Err(self.wrong_kind(name, other, "eop_weight")),
        }
    }

    /// Store a channel map.
    pub fn put_map(&mut self, name: &str, map: &PartialMap, mode: WriteMode) -> Result<()> {
        if let Some((index, v)) = map.iter().find(|(_, v)| v.is_some_and(|x| !x.is_finite())) {
            let (ieta, iphi) = map.grid().coords(index)?;
            return Err(Error::Validation(format!(
                "map '{name}': non-finite value {v:?} at (ieta={ieta}, iphi={iphi})"
            )));
        }
        let obj = StoredMap { title: name.to_string(), grid: map.grid(), values: map.values().to_vec() };
        self.put_object(name, StoredObject::ChannelMap(obj), mode)
    }

    /// Store a weight table.
    pub fn put_weight_table(&mut self, name: &str, table: &EopWeightTable, mode: WriteMode) -> Result<()> {
        self.put_object(name, StoredObject::EopWeight(table.clone()), mode)
    }

    fn put_object(&mut self, name: &str, obj: StoredObject, mode: WriteMode) -> Result<()> {
        if mode == WriteMode::Create && self.doc.objects.contains_key(name) {
            return Err(Error::Validation(format!(
                "object '{name}' already exists in {}",
                self.path.display()
            )));
        }
        self.doc.objects.insert(name.to_string(), obj);
        Ok(())
    }

    /// Remove an object. Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.doc.objects.remove(name).is_some()
    }

    /// File-level metadata.
    pub fn meta(&self) -> &BTreeMap<String, String> {
        &self.doc.meta
    }

    /// Set a metadata entry.
    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.doc.meta.insert(key.into(), value.into());
    }

    /// Write the file: serialize to a sibling temp file, then rename over the target.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| Error::Validation(format!("invalid map file path: {}", self.path.display())))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        {
            let mut w = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut w, &self.doc)?;
            w.write_all(b"\n")?;
            w.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), objects = self.doc.objects.len(), "saved map file");
        Ok(())
    }

    fn wrong_kind(&self, name: &str, obj: &StoredObject, expected: &str) -> Error {
        Error::Validation(format!(
            "object '{name}' in {} is a {}, expected {expected}",
            self.path.display(),
            obj.kind()
        ))
    }
}

impl MapStore for MapFile {
    fn keys(&self) -> Vec<String> {
        self.doc.objects.keys().cloned().collect()
    }

    fn load_map(&self, name: &str) -> Result<PartialMap> {
        self.get_map(name)
    }

    fn save_map(&mut self, name: &str, map: &PartialMap, mode: WriteMode) -> Result<()> {
        self.put_map(name, map, mode)
    }

    fn remove(&mut self, name: &str) -> bool {
        MapFile::remove(self, name)
    }

    fn contains(&self, name: &str) -> bool {
        self.doc.objects.contains_key(name)
    }
}
