//! In-process record store backed by an immutable [`RecordSet`].
//!
//! Point records are indexed in R-trees keyed on `[lng, lat]` so bounded
//! scans touch only the candidates inside the query box. The whole
//! indexed snapshot is swapped atomically by [`MemoryStore::replace`],
//! which stands in for the out-of-band bulk refresh of the reference data.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use phillow_records_models::{
    BoundingBox, CrimeIncident, GeoPoint, PoliceStation, Property, RecordSet, ZipPopulation,
};
use rstar::{AABB, RTree, RTreeObject};

use crate::{RecordStore, RecordStoreError};

/// A record position stored in the R-tree, pointing back into the
/// snapshot's vector.
struct PointEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl PointEntry {
    fn new(index: usize, point: GeoPoint) -> Self {
        Self {
            index,
            envelope: AABB::from_point([point.longitude, point.latitude]),
        }
    }
}

impl RTreeObject for PointEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

struct Indexed {
    records: Arc<RecordSet>,
    crimes: RTree<PointEntry>,
    stations: RTree<PointEntry>,
}

impl Indexed {
    fn build(records: Arc<RecordSet>) -> Self {
        let crimes = records
            .crime_incidents
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.location().map(|p| PointEntry::new(i, p)))
            .collect();
        let stations = records
            .police_stations
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                let point = s.point();
                if point.is_finite() {
                    Some(PointEntry::new(i, point))
                } else {
                    log::debug!("Skipping station {} with non-finite coordinates", s.object_id);
                    None
                }
            })
            .collect();

        Self {
            crimes: RTree::bulk_load(crimes),
            stations: RTree::bulk_load(stations),
            records,
        }
    }
}

fn query_envelope(bounds: BoundingBox) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [bounds.min_lng, bounds.min_lat],
        [bounds.max_lng, bounds.max_lat],
    )
}

/// Record store holding the reference tables in memory.
pub struct MemoryStore {
    current: ArcSwap<Indexed>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(records: RecordSet) -> Self {
        Self {
            current: ArcSwap::from_pointee(Indexed::build(Arc::new(records))),
        }
    }

    /// Replaces the stored records with a new snapshot.
    ///
    /// Readers already holding the previous snapshot keep it; new reads
    /// see the replacement.
    pub fn replace(&self, records: RecordSet) {
        log::info!("Replacing in-memory records ({} total)", records.len());
        self.current
            .store(Arc::new(Indexed::build(Arc::new(records))));
    }

    fn records(&self) -> Arc<RecordSet> {
        Arc::clone(&self.current.load().records)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn properties(&self) -> Result<Vec<Property>, RecordStoreError> {
        Ok(self.records().properties.clone())
    }

    async fn crime_incidents(&self) -> Result<Vec<CrimeIncident>, RecordStoreError> {
        Ok(self.records().crime_incidents.clone())
    }

    async fn police_stations(&self) -> Result<Vec<PoliceStation>, RecordStoreError> {
        Ok(self.records().police_stations.clone())
    }

    async fn zip_populations(&self) -> Result<Vec<ZipPopulation>, RecordStoreError> {
        Ok(self.records().zip_populations.clone())
    }

    async fn crime_incidents_within(
        &self,
        bounds: BoundingBox,
    ) -> Result<Vec<CrimeIncident>, RecordStoreError> {
        let indexed = self.current.load();
        let envelope = query_envelope(bounds);
        let mut hits: Vec<usize> = indexed
            .crimes
            .locate_in_envelope_intersecting(&envelope)
            .map(|e| e.index)
            .collect();
        hits.sort_unstable();

        Ok(hits
            .into_iter()
            .map(|i| indexed.records.crime_incidents[i].clone())
            .collect())
    }

    async fn police_stations_within(
        &self,
        bounds: BoundingBox,
    ) -> Result<Vec<PoliceStation>, RecordStoreError> {
        let indexed = self.current.load();
        let envelope = query_envelope(bounds);
        let mut hits: Vec<usize> = indexed
            .stations
            .locate_in_envelope_intersecting(&envelope)
            .map(|e| e.index)
            .collect();
        hits.sort_unstable();

        Ok(hits
            .into_iter()
            .map(|i| indexed.records.police_stations[i].clone())
            .collect())
    }

    async fn snapshot(&self) -> Result<Arc<RecordSet>, RecordStoreError> {
        Ok(self.records())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn incident(id: &str, lat: Option<f64>, lng: Option<f64>) -> CrimeIncident {
        CrimeIncident {
            object_id: id.to_string(),
            zip_code: "19104".to_string(),
            location_block: "3400 BLOCK WALNUT ST".to_string(),
            crime_type: "Thefts".to_string(),
            dispatch_date: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            dispatch_time: None,
            lat,
            lng,
        }
    }

    fn station(id: &str, lat: f64, lng: f64) -> PoliceStation {
        PoliceStation {
            object_id: id.to_string(),
            location: format!("{id} MAIN ST"),
            zip_code: "19104".to_string(),
            lat,
            lng,
        }
    }

    fn bounds() -> BoundingBox {
        BoundingBox {
            min_lat: 39.94,
            max_lat: 39.96,
            min_lng: -75.20,
            max_lng: -75.18,
        }
    }

    #[tokio::test]
    async fn bounded_scan_matches_full_scan() {
        let store = MemoryStore::new(RecordSet {
            crime_incidents: vec![
                incident("a", Some(39.95), Some(-75.19)),
                incident("b", Some(40.10), Some(-75.19)),
                incident("c", None, None),
                incident("d", Some(39.955), Some(-75.185)),
            ],
            police_stations: vec![station("1", 39.95, -75.19), station("2", 39.0, -75.0)],
            ..RecordSet::default()
        });

        let crimes = store.crime_incidents_within(bounds()).await.unwrap();
        let ids: Vec<&str> = crimes.iter().map(|c| c.object_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);

        let stations = store.police_stations_within(bounds()).await.unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].object_id, "1");
    }

    #[tokio::test]
    async fn replace_swaps_snapshot() {
        let store = MemoryStore::new(RecordSet::default());
        let before = store.snapshot().await.unwrap();

        store.replace(RecordSet {
            police_stations: vec![station("1", 39.95, -75.19)],
            ..RecordSet::default()
        });

        assert!(before.police_stations.is_empty());
        assert_eq!(store.police_stations().await.unwrap().len(), 1);
        assert_eq!(
            store.police_stations_within(bounds()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn non_finite_coordinates_are_not_indexed() {
        let data = "object_id,zip_code,location_block,text_general_code,dispatch_date,dispatch_time,lat,lng\n\
                    a,19104,3400 BLOCK WALNUT ST,Thefts,2018-02-03,,39.95,-75.19\n\
                    b,19104,3400 BLOCK WALNUT ST,Thefts,2018-02-03,,NaN,-75.19\n\
                    c,19104,3400 BLOCK WALNUT ST,Thefts,2018-02-03,,39.95,inf\n";
        let mut crimes: Vec<CrimeIncident> = crate::csv_dir::read_table(data.as_bytes()).unwrap();
        assert!(crimes[1].lat.unwrap().is_nan());
        crimes.extend((0..200).map(|i| {
            let lat = if i % 7 == 0 { f64::NAN } else { 39.95 };
            incident(&format!("n{i}"), Some(lat), Some(-75.19))
        }));

        let store = MemoryStore::new(RecordSet {
            crime_incidents: crimes,
            police_stations: vec![
                station("1", 39.95, -75.19),
                station("2", f64::NAN, -75.19),
                station("3", 39.95, f64::NEG_INFINITY),
            ],
            ..RecordSet::default()
        });

        let hits = store.crime_incidents_within(bounds()).await.unwrap();
        assert_eq!(hits.len(), 1 + 200 - 29);
        assert!(hits.iter().all(|c| c.location().is_some()));

        let stations = store.police_stations_within(bounds()).await.unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].object_id, "1");
        assert_eq!(store.police_stations().await.unwrap().len(), 3);
    }
}
