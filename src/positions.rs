// ===============================
// src/positions.rs (local -> remote position map)
// ===============================
//
// Satu-satunya state inti: local position id -> remote order/position id.
// Kontrak pemakaian:
// - insert hanya setelah OPEN remote sukses,
// - remove hanya setelah CLOSE remote sukses,
// - lookup yang gagal saat CLOSE berarti tidak ada counterpart remote
//   (bukan kondisi crash; caller yang memutuskan).
//
// Default in-memory saja (restart = kosong). Jika MAP_FILE di-set, map
// di-load saat start dan disimpan ulang setiap mutasi sukses.

use ahash::AHashMap as HashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct PositionMap {
    map: HashMap<u64, String>,
    persist_path: Option<PathBuf>,
}

impl PositionMap {
    pub fn new() -> Self { Self::default() }

    /// Map dengan file persistence; entri lama di-load jika file-nya ada.
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = load_mapping(&path);
        Self { map, persist_path: Some(path) }
    }

    pub fn put(&mut self, local_id: u64, remote_id: impl Into<String>) {
        self.map.insert(local_id, remote_id.into());
        self.save();
    }

    pub fn get(&self, local_id: u64) -> Option<&str> {
        self.map.get(&local_id).map(|s| s.as_str())
    }

    /// No-op jika key tidak ada.
    pub fn remove(&mut self, local_id: u64) {
        if self.map.remove(&local_id).is_some() {
            self.save();
        }
    }

    pub fn len(&self) -> usize { self.map.len() }
    pub fn is_empty(&self) -> bool { self.map.is_empty() }

    fn save(&self) {
        if let Some(path) = &self.persist_path {
            // JSON pakai key string agar kompatibel lintas tool
            let as_strings: BTreeMap<String, &str> =
                self.map.iter().map(|(k, v)| (k.to_string(), v.as_str())).collect();
            match serde_json::to_vec_pretty(&as_strings) {
                Ok(buf) => {
                    if let Err(e) = std::fs::write(path, buf) {
                        warn!(?e, path = %path.display(), "position map save failed");
                    }
                }
                Err(e) => warn!(?e, "position map serialize failed"),
            }
        }
    }
}

fn load_mapping(path: &Path) -> HashMap<u64, String> {
    if !path.exists() {
        info!(path = %path.display(), "no existing map file, starting empty");
        return HashMap::new();
    }
    let raw = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!(?e, path = %path.display(), "map file read failed, starting empty");
            return HashMap::new();
        }
    };
    match serde_json::from_slice::<BTreeMap<String, String>>(&raw) {
        Ok(parsed) => {
            let mut map = HashMap::new();
            for (k, v) in parsed {
                match k.parse::<u64>() {
                    Ok(id) => { map.insert(id, v); }
                    Err(_) => warn!(key = %k, "map file: non-numeric key skipped"),
                }
            }
            info!(path = %path.display(), entries = map.len(), "loaded position map");
            map
        }
        Err(e) => {
            warn!(?e, path = %path.display(), "map file parse failed, starting empty");
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove_contract() {
        let mut pm = PositionMap::new();
        assert!(pm.get(42).is_none());

        pm.put(42, "900");
        assert_eq!(pm.get(42), Some("900"));
        assert_eq!(pm.len(), 1);

        // re-register overwrites
        pm.put(42, "901");
        assert_eq!(pm.get(42), Some("901"));
        assert_eq!(pm.len(), 1);

        pm.remove(42);
        assert!(pm.get(42).is_none());
        assert!(pm.is_empty());

        // remove pada key absen = no-op
        pm.remove(42);
        assert!(pm.is_empty());
    }

    #[test]
    fn persistence_survives_reload() {
        let path = std::env::temp_dir().join(format!("copier_map_{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let mut pm = PositionMap::with_file(&path);
            assert!(pm.is_empty());
            pm.put(7, "555");
            pm.put(8, "556");
            pm.remove(8);
        }

        let pm = PositionMap::with_file(&path);
        assert_eq!(pm.get(7), Some("555"));
        assert!(pm.get(8).is_none());
        assert_eq!(pm.len(), 1);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let path = std::env::temp_dir().join(format!("copier_map_bad_{}.json", std::process::id()));
        std::fs::write(&path, b"not json").unwrap();

        let pm = PositionMap::with_file(&path);
        assert!(pm.is_empty());

        let _ = std::fs::remove_file(&path);
    }
}
