//! serde_json deserialization that reports *where* a document went wrong.
use serde::de::DeserializeOwned;

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, String> {
    with_path(&mut serde_json::Deserializer::from_str(src))
}

pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, String> {
    with_path(&mut serde_json::Deserializer::from_slice(bytes))
}

/// Read `path` and deserialize it, prefixing errors with the file name.
pub fn from_file_with_path<T: DeserializeOwned>(path: &std::path::Path) -> Result<T, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
    from_slice_with_path(&bytes).map_err(|e| format!("{}: {e}", path.display()))
}

fn with_path<'de, R, T>(de: &mut serde_json::Deserializer<R>) -> Result<T, String>
where
    R: serde_json::de::Read<'de>,
    T: DeserializeOwned,
{
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| {
        let path = err.path().to_string();
        format!("at JSON path {path} → {}", err.into_inner())
    })
}
