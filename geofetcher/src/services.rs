//! Fixed registry of the deployment's map services. The upstream exposes a
//! known set of service ids; names repeat across ids and several services
//! share an output folder.

/// One map service of the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapService {
    pub id: u32,
    pub name: &'static str,
    /// Output folder under the configured outputs directory.
    pub folder: &'static str,
}

pub const MAP_SERVICES: &[MapService] = &[
    MapService { id: 0, name: "capital", folder: "provincia" },
    MapService { id: 1, name: "provincia", folder: "sin" },
    MapService { id: 2, name: "capitalalto_volt", folder: "landbase" },
    MapService { id: 3, name: "LandBase", folder: "sin_provincia" },
    MapService { id: 6, name: "provinciaalto_volt", folder: "provincia" },
    MapService { id: 7, name: "provincia", folder: "sin" },
    MapService { id: 8, name: "capital", folder: "provincia" },
];

/// (service id, layer id) pairs that always answer a query with an error
/// body despite being listed in the directory. Treated as "zero features",
/// not as a failure.
pub const EMPTY_LAYERS: &[(u32, u32)] = &[(0, 1)];

pub fn is_known_empty(service_id: u32, layer_id: u32) -> bool {
    EMPTY_LAYERS.contains(&(service_id, layer_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_empty_lookup() {
        assert!(is_known_empty(0, 1));
        assert!(!is_known_empty(0, 2));
        assert!(!is_known_empty(1, 1));
    }

    #[test]
    fn every_service_has_a_folder() {
        for service in MAP_SERVICES {
            assert!(!service.folder.is_empty(), "service {} lacks a folder", service.id);
        }
    }
}
