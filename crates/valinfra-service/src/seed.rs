//! Seeding of network setup configurations.
//!
//! Network configurations are operator data: the service reads them from a
//! JSON array on startup and upserts each one into the store.

use std::path::Path;

use tracing::info;
use valinfra_store::{NetworkSetupConfig, Store};

use crate::error::{Result, ServiceError};

/// Read a JSON array of network setup configurations.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub fn load_network_configs(path: &Path) -> Result<Vec<NetworkSetupConfig>> {
    let raw = std::fs::read(path).map_err(|source| ServiceError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_slice(&raw).map_err(|source| ServiceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Upsert each configuration into the store. Returns how many were written.
///
/// # Errors
///
/// Returns an error on the first store failure.
pub fn seed_network_configs<S: Store>(store: &S, configs: &[NetworkSetupConfig]) -> Result<usize> {
    for config in configs {
        store.put_network_config(config)?;
        info!(network = %config.network, name = %config.name, "Seeded network configuration");
    }
    Ok(configs.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use valinfra_store::RocksStore;

    const NETWORKS: &str = r#"[
        {
            "network": "cosmoshub-4",
            "name": "Cosmos Hub",
            "container_name": "gaiad",
            "default_size_gigabytes": 400,
            "chain": {
                "chain_id": "cosmoshub-4",
                "rest_url": "https://rest.cosmos.directory/cosmoshub",
                "denom": "uatom",
                "decimals": 6
            }
        },
        {
            "network": "osmosis-1",
            "name": "Osmosis",
            "container_name": "osmosisd",
            "setup_script": "setup-osmosis.sh",
            "default_size_gigabytes": 800,
            "chain": {
                "chain_id": "osmosis-1",
                "rest_url": "https://rest.cosmos.directory/osmosis",
                "denom": "uosmo",
                "decimals": 6
            }
        }
    ]"#;

    fn write_file(dir: &Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("networks.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_and_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), NETWORKS);

        let configs = load_network_configs(&path).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[1].setup_script.as_deref(), Some("setup-osmosis.sh"));
        assert!(configs[0].status_command.is_none());

        let store = RocksStore::open(dir.path().join("db")).unwrap();
        assert_eq!(seed_network_configs(&store, &configs).unwrap(), 2);

        let hub = store.get_network_config("cosmoshub-4").unwrap().unwrap();
        assert_eq!(hub.container_name, "gaiad");
        assert_eq!(hub.default_size_gigabytes, 400);

        // Seeding again upserts rather than duplicating.
        seed_network_configs(&store, &configs).unwrap();
        assert_eq!(store.list_network_configs().unwrap().len(), 2);
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_network_configs(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ServiceError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), r#"[{"network": "cosmoshub-4"}]"#);
        let err = load_network_configs(&path).unwrap_err();
        assert!(matches!(err, ServiceError::Parse { .. }));
    }
}
