//! Catalog-driven postage stamps and injection into them.
//!
//! The catalog and the image archive are external services; they are reached
//! through the [`ObjectCatalog`] and [`CoaddArchive`] traits so that the
//! selection and cutout logic here stays independent of any particular
//! backend.

use std::collections::BTreeMap;

use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use starfield::Equatorial;

use crate::error::LampError;
use crate::image_size::ImageSize;
use crate::inject::SpectrumInjector;
use crate::source::ScaledImage;
use crate::wcs::{TanWcs, WorldCoordinateSystem};

/// Columns every catalog query returns.
pub const BASE_COLUMNS: [&str; 5] = ["objectId", "ra", "dec", "tract", "patch"];

/// One catalog object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    #[serde(rename = "objectId")]
    pub object_id: i64,
    pub ra: f64,
    pub dec: f64,
    pub tract: i64,
    pub patch: String,
    /// Additional numeric columns requested by the query
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl CatalogRecord {
    pub fn sky(&self) -> Equatorial {
        Equatorial::from_degrees(self.ra, self.dec)
    }
}

/// Single-band pixel data with its world-coordinate system.
#[derive(Debug, Clone, PartialEq)]
pub struct Exposure {
    band: char,
    data: Array2<f64>,
    wcs: TanWcs,
}

impl Exposure {
    pub fn new(band: char, data: Array2<f64>, wcs: TanWcs) -> Self {
        Self { band, data, wcs }
    }

    pub fn band(&self) -> char {
        self.band
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn wcs(&self) -> &TanWcs {
        &self.wcs
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::of_array(&self.data)
    }
}

/// Integer pixel box in a tract's pixel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x0: i64,
    pub y0: i64,
    pub size: ImageSize,
}

impl PixelBox {
    /// Square box of `side` pixels whose centre is nearest to `(x, y)`.
    pub fn centered_on(x: f64, y: f64, side: usize) -> Self {
        let half = side as f64 * 0.5;
        Self {
            x0: (x - half + 0.5).floor() as i64,
            y0: (y - half + 0.5).floor() as i64,
            size: ImageSize::from_width_height(side, side),
        }
    }
}

/// Band-ordered exposures cut around one catalog object.
#[derive(Debug, Clone, PartialEq)]
pub struct Cutout {
    record: CatalogRecord,
    exposures: Vec<Exposure>,
}

impl Cutout {
    pub fn new(exposures: Vec<Exposure>, record: CatalogRecord) -> Self {
        Self { record, exposures }
    }

    pub fn record(&self) -> &CatalogRecord {
        &self.record
    }

    pub fn exposures(&self) -> &[Exposure] {
        &self.exposures
    }

    /// Band labels in exposure order, e.g. `"irg"`.
    pub fn bands(&self) -> String {
        self.exposures.iter().map(Exposure::band).collect()
    }

    /// Inject `lensed` at the object's sky position, one spectrum value per
    /// band, returning a new cutout. `self` is left untouched.
    pub fn inject(
        &self,
        lensed: &ScaledImage,
        spectrum: &[f64],
        injector: &SpectrumInjector,
    ) -> Result<Cutout, LampError> {
        let bands: Vec<(&dyn WorldCoordinateSystem, &Array2<f64>)> = self
            .exposures
            .iter()
            .map(|e| (&e.wcs as &dyn WorldCoordinateSystem, &e.data))
            .collect();
        let injected = injector.inject_bands(lensed, spectrum, &self.record.sky(), &bands)?;

        let exposures = self
            .exposures
            .iter()
            .zip(injected)
            .map(|(e, data)| Exposure::new(e.band, data, e.wcs))
            .collect();
        Ok(Cutout::new(exposures, self.record.clone()))
    }
}

/// Queryable object catalog.
pub trait ObjectCatalog {
    /// Whether every column is available.
    fn has_quantities(&self, columns: &[String]) -> bool;

    /// Records matching every entry of `filters` and, when given, the
    /// backend-native `native_filter` expression.
    fn get_quantities(
        &self,
        columns: &[String],
        filters: &[String],
        native_filter: Option<&str>,
    ) -> Result<Vec<CatalogRecord>, LampError>;
}

/// Coadd image archive.
pub trait CoaddArchive {
    /// WCS of the tract containing `sky`.
    fn tract_wcs(&self, sky: &Equatorial) -> Result<TanWcs, LampError>;

    /// Pixels of `bbox` (tract pixel frame) in one band.
    fn get_coadd(
        &self,
        bbox: &PixelBox,
        tract: i64,
        patch: &str,
        band: char,
    ) -> Result<Exposure, LampError>;
}

/// Native filter selecting any of `tracts`, `None` when the list is empty.
pub fn tract_filter(tracts: &[i64]) -> Option<String> {
    let clauses: Vec<String> = tracts.iter().map(|t| format!("(tract == {t})")).collect();
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" | "))
    }
}

/// Lens-candidate selection and cutout extraction.
#[derive(Debug)]
pub struct Candidates<C, A> {
    catalog: C,
    archive: A,
}

impl<C: ObjectCatalog, A: CoaddArchive> Candidates<C, A> {
    pub fn new(catalog: C, archive: A) -> Self {
        Self { catalog, archive }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    /// Query the catalog for objects passing `filters`.
    ///
    /// Always requests [`BASE_COLUMNS`] plus `extra_columns` (duplicates
    /// dropped) and restricts to `tracts` when given.
    pub fn catalog_query(
        &self,
        filters: &[String],
        extra_columns: &[String],
        tracts: Option<&[i64]>,
    ) -> Result<Vec<CatalogRecord>, LampError> {
        let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        for column in extra_columns {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }

        if !self.catalog.has_quantities(&columns) {
            return Err(LampError::config(format!(
                "catalog does not provide all of: {}",
                columns.join(", ")
            )));
        }

        let native = tracts.and_then(tract_filter);
        let records = self
            .catalog
            .get_quantities(&columns, filters, native.as_deref())?;
        info!("Catalog query returned {} object(s)", records.len());
        Ok(records)
    }

    /// Cut a `cutout_size`-square stamp around every record in each of `bands`.
    pub fn make_postage_stamps(
        &self,
        records: &[CatalogRecord],
        cutout_size: usize,
        bands: &str,
    ) -> Result<Vec<Cutout>, LampError> {
        if cutout_size == 0 {
            return Err(LampError::config("cutout size must be at least one pixel"));
        }
        if bands.is_empty() {
            return Err(LampError::config("at least one band is required"));
        }

        records
            .iter()
            .map(|record| {
                let sky = record.sky();
                let wcs = self.archive.tract_wcs(&sky)?;
                let (x, y) = wcs.sky_to_pixel(&sky).ok_or_else(|| {
                    LampError::config(format!(
                        "object {} cannot be projected into its tract",
                        record.object_id
                    ))
                })?;
                let bbox = PixelBox::centered_on(x, y, cutout_size);
                debug!(
                    "Object {} at tract pixel ({x:.1}, {y:.1}), box origin ({}, {})",
                    record.object_id, bbox.x0, bbox.y0
                );

                let exposures = bands
                    .chars()
                    .map(|band| self.archive.get_coadd(&bbox, record.tract, &record.patch, band))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Cutout::new(exposures, record.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::RefCell;

    fn record(id: i64, ra: f64, dec: f64) -> CatalogRecord {
        CatalogRecord {
            object_id: id,
            ra,
            dec,
            tract: 4850,
            patch: "3,4".to_string(),
            extra: BTreeMap::new(),
        }
    }

    struct MockCatalog {
        columns: Vec<String>,
        records: Vec<CatalogRecord>,
        last_query: RefCell<Option<(Vec<String>, Vec<String>, Option<String>)>>,
    }

    impl ObjectCatalog for MockCatalog {
        fn has_quantities(&self, columns: &[String]) -> bool {
            columns.iter().all(|c| self.columns.contains(c))
        }

        fn get_quantities(
            &self,
            columns: &[String],
            filters: &[String],
            native_filter: Option<&str>,
        ) -> Result<Vec<CatalogRecord>, LampError> {
            *self.last_query.borrow_mut() = Some((
                columns.to_vec(),
                filters.to_vec(),
                native_filter.map(str::to_string),
            ));
            Ok(self.records.clone())
        }
    }

    struct MockArchive {
        tract: TanWcs,
    }

    impl CoaddArchive for MockArchive {
        fn tract_wcs(&self, _sky: &Equatorial) -> Result<TanWcs, LampError> {
            Ok(self.tract)
        }

        fn get_coadd(
            &self,
            bbox: &PixelBox,
            _tract: i64,
            _patch: &str,
            band: char,
        ) -> Result<Exposure, LampError> {
            Ok(Exposure::new(
                band,
                bbox.size.zeros(),
                self.tract.cropped(bbox.x0, bbox.y0),
            ))
        }
    }

    fn candidates() -> Candidates<MockCatalog, MockArchive> {
        let columns = ["objectId", "ra", "dec", "tract", "patch", "mag_i"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let tract = TanWcs::centered(
            ImageSize::from_width_height(4000, 4000),
            Equatorial::from_degrees(55.0, -30.0),
            0.2,
        )
        .unwrap();
        Candidates::new(
            MockCatalog {
                columns,
                records: vec![record(1, 55.01, -30.01), record(2, 54.99, -29.995)],
                last_query: RefCell::new(None),
            },
            MockArchive { tract },
        )
    }

    #[test]
    fn test_tract_filter() {
        assert_eq!(tract_filter(&[]), None);
        assert_eq!(tract_filter(&[4850]).unwrap(), "(tract == 4850)");
        assert_eq!(
            tract_filter(&[4850, 4851, 5063]).unwrap(),
            "(tract == 4850) | (tract == 4851) | (tract == 5063)"
        );
    }

    #[test]
    fn test_catalog_query_columns_and_filters() {
        let candidates = candidates();
        let filters = vec!["mag_i < 24".to_string()];
        let extra = vec!["mag_i".to_string(), "ra".to_string()];

        let records = candidates
            .catalog_query(&filters, &extra, Some(&[4850, 4851][..]))
            .unwrap();
        assert_eq!(records.len(), 2);

        let (columns, sent_filters, native) =
            candidates.catalog().last_query.borrow().clone().unwrap();
        assert_eq!(
            columns,
            vec!["objectId", "ra", "dec", "tract", "patch", "mag_i"]
        );
        assert_eq!(sent_filters, filters);
        assert_eq!(native.as_deref(), Some("(tract == 4850) | (tract == 4851)"));
    }

    #[test]
    fn test_catalog_query_missing_column() {
        let candidates = candidates();
        let err = candidates
            .catalog_query(&[], &["redshift".to_string()], None)
            .unwrap_err();
        assert!(matches!(err, LampError::Configuration(_)));
    }

    #[test]
    fn test_postage_stamps_are_centred() {
        let candidates = candidates();
        let records = vec![record(7, 55.003, -29.998)];
        let cutouts = candidates
            .make_postage_stamps(&records, 100, "irg")
            .unwrap();

        assert_eq!(cutouts.len(), 1);
        let cutout = &cutouts[0];
        assert_eq!(cutout.bands(), "irg");
        for exposure in cutout.exposures() {
            assert_eq!(exposure.size(), ImageSize::from_width_height(100, 100));
            let (x, y) = exposure.wcs().sky_to_pixel(&records[0].sky()).unwrap();
            assert!((49.0..=51.0).contains(&x), "x = {x}");
            assert!((49.0..=51.0).contains(&y), "y = {y}");
        }
    }

    #[test]
    fn test_cutout_inject_returns_new_cutout() {
        let candidates = candidates();
        let records = vec![record(7, 55.003, -29.998)];
        let cutout = candidates
            .make_postage_stamps(&records, 60, "gr")
            .unwrap()
            .remove(0);

        let mut stamp = Array2::zeros((10, 10));
        stamp[[4, 4]] = 1.0;
        let lensed = ScaledImage::new(stamp, 0.05).unwrap();

        let injected = cutout
            .inject(&lensed, &[2.0, 3.0], &SpectrumInjector::new())
            .unwrap();
        assert_relative_eq!(injected.exposures()[0].data().sum(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(injected.exposures()[1].data().sum(), 3.0, epsilon = 1e-9);
        assert_eq!(injected.record(), cutout.record());
        assert!(cutout.exposures().iter().all(|e| e.data().sum() == 0.0));

        let err = cutout
            .inject(&lensed, &[1.0], &SpectrumInjector::new())
            .unwrap_err();
        assert!(matches!(err, LampError::Configuration(_)));
    }

    #[test]
    fn test_record_serde_uses_catalog_names() {
        let json = r#"{
            "objectId": 12, "ra": 55.1, "dec": -30.2,
            "tract": 4850, "patch": "1,1", "mag_i": 22.5
        }"#;
        let record: CatalogRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.object_id, 12);
        assert_eq!(record.extra.get("mag_i"), Some(&22.5));
    }
}
