//! Reading HAB region polygons from a shapefile bundle.
//!
//! The bundle arrives either as the zip archive the region dataset is
//! published as, or as a directory it was already extracted into. Both
//! paths end in the same reader: the `.shp` geometry plus the `.dbf`
//! attribute table, with one region id taken from a named attribute.

use std::io::{Cursor, Read as _};
use std::path::{Path, PathBuf};

use geo::MultiPolygon;
use hab_effort_models::RegionId;
use shapefile::dbase::FieldValue;

use crate::SpatialError;

/// Default name of the region id attribute.
pub const DEFAULT_ATTRIBUTE: &str = "hab_region";

/// A region polygon with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Value of the id attribute.
    pub id: RegionId,
    /// Region footprint in lon/lat degrees.
    pub geometry: MultiPolygon<f64>,
}

/// Reads regions from a zipped shapefile held in memory.
///
/// The first `.shp` entry (by name) is used, together with the `.dbf`
/// entry sharing its stem. macOS resource-fork entries are ignored.
///
/// # Errors
///
/// Returns [`SpatialError`] if the archive cannot be opened, has no
/// shapefile, or the shapefile is malformed.
pub fn read_zip(bytes: &[u8], attribute: &str) -> Result<Vec<Region>, SpatialError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| !name.starts_with("__MACOSX/"))
        .map(str::to_owned)
        .collect();
    names.sort();

    let shp_name = names
        .iter()
        .find(|name| has_extension(name, "shp"))
        .ok_or_else(|| SpatialError::Malformed {
            message: "Region archive contains no .shp file".to_string(),
        })?
        .clone();
    let stem = &shp_name[..shp_name.len() - ".shp".len()];
    let dbf_name = names
        .iter()
        .find(|name| {
            name.len() == shp_name.len()
                && name.starts_with(stem)
                && has_extension(name, "dbf")
        })
        .ok_or_else(|| SpatialError::Malformed {
            message: format!("Region archive has {shp_name} but no matching .dbf"),
        })?
        .clone();

    log::info!("Reading regions from archive entries {shp_name} + {dbf_name}");

    let shp = read_entry(&mut archive, &shp_name)?;
    let dbf = read_entry(&mut archive, &dbf_name)?;

    read_shapefile(shp, dbf, attribute)
}

/// Reads regions from a directory holding an extracted shapefile.
///
/// # Errors
///
/// Returns [`SpatialError`] if the directory has no `.shp`, the `.dbf`
/// is missing, or the shapefile is malformed.
pub fn read_dir(dir: &Path, attribute: &str) -> Result<Vec<Region>, SpatialError> {
    let shp_path = find_shp(dir)?;
    let dbf_path = shp_path.with_extension("dbf");
    if !dbf_path.exists() {
        return Err(SpatialError::Malformed {
            message: format!("{} has no matching .dbf", shp_path.display()),
        });
    }

    log::info!("Reading regions from {}", shp_path.display());

    let shp = std::fs::read(&shp_path).map_err(|e| SpatialError::Io {
        path: shp_path.display().to_string(),
        source: e,
    })?;
    let dbf = std::fs::read(&dbf_path).map_err(|e| SpatialError::Io {
        path: dbf_path.display().to_string(),
        source: e,
    })?;

    read_shapefile(shp, dbf, attribute)
}

/// Whether `dir` holds a shapefile that [`read_dir`] could open.
#[must_use]
pub fn dir_has_shapefile(dir: &Path) -> bool {
    find_shp(dir).is_ok()
}

fn find_shp(dir: &Path) -> Result<PathBuf, SpatialError> {
    let entries = std::fs::read_dir(dir).map_err(|e| SpatialError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut shps: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("shp"))
        })
        .collect();
    shps.sort();

    shps.into_iter()
        .next()
        .ok_or_else(|| SpatialError::Malformed {
            message: format!("No .shp file in {}", dir.display()),
        })
}

fn has_extension(name: &str, ext: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn read_entry<R: std::io::Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, SpatialError> {
    let mut file = archive.by_name(name)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(|e| SpatialError::Io {
        path: name.to_string(),
        source: e,
    })?;
    Ok(buf)
}

fn read_shapefile(
    shp: Vec<u8>,
    dbf: Vec<u8>,
    attribute: &str,
) -> Result<Vec<Region>, SpatialError> {
    let shape_reader = shapefile::ShapeReader::new(Cursor::new(shp))?;
    let dbase_reader =
        shapefile::dbase::Reader::new(Cursor::new(dbf)).map_err(|e| SpatialError::Malformed {
            message: format!("Invalid .dbf attribute table: {e}"),
        })?;
    let mut reader = shapefile::Reader::new(shape_reader, dbase_reader);

    let mut regions = Vec::new();
    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result?;

        let value = record
            .get(attribute)
            .ok_or_else(|| SpatialError::Malformed {
                message: format!("Record {index} has no {attribute:?} attribute"),
            })?;
        let id = parse_region_id(value).ok_or_else(|| SpatialError::Malformed {
            message: format!("Record {index}: {attribute:?} is not a region id ({value:?})"),
        })?;

        let geometry = match geo::Geometry::<f64>::try_from(shape) {
            Ok(geo::Geometry::MultiPolygon(mp)) => mp,
            Ok(geo::Geometry::Polygon(p)) => MultiPolygon(vec![p]),
            Ok(other) => {
                return Err(SpatialError::Malformed {
                    message: format!(
                        "Record {index} (region {id}) is not a polygon: {}",
                        geometry_kind(&other)
                    ),
                });
            }
            Err(e) => {
                return Err(SpatialError::Malformed {
                    message: format!("Record {index} (region {id}) has no usable geometry: {e:?}"),
                });
            }
        };

        regions.push(Region { id, geometry });
    }

    if regions.is_empty() {
        return Err(SpatialError::Malformed {
            message: "Region shapefile has no records".to_string(),
        });
    }

    log::info!("Read {} region polygons", regions.len());
    Ok(regions)
}

/// Converts a `.dbf` attribute value into a region id.
///
/// Accepts integer-valued numerics and numeric strings; anything else
/// (including null and fractional values) is rejected.
#[must_use]
pub fn parse_region_id(value: &FieldValue) -> Option<RegionId> {
    let number = match value {
        FieldValue::Integer(i) => f64::from(*i),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) => *n,
        FieldValue::Float(Some(f)) => f64::from(*f),
        FieldValue::Character(Some(s)) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if number.fract() != 0.0 || number < 0.0 || number > f64::from(u32::MAX) {
        return None;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(RegionId(number as u32))
}

const fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) | geo::Geometry::MultiPoint(_) => "points",
        geo::Geometry::Line(_)
        | geo::Geometry::LineString(_)
        | geo::Geometry::MultiLineString(_) => "lines",
        _ => "non-polygon geometry",
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn archive_without_shp_is_malformed() {
        let bytes = zip_with(&[("readme.txt", b"no shapes here".as_slice())]);
        let err = read_zip(&bytes, DEFAULT_ATTRIBUTE).unwrap_err();
        assert!(matches!(err, SpatialError::Malformed { .. }), "{err}");
    }

    #[test]
    fn archive_without_dbf_is_malformed() {
        let bytes = zip_with(&[
            ("hab/regions.shp", b"not really a shapefile".as_slice()),
            ("hab/other.dbf", b"wrong stem".as_slice()),
        ]);
        let err = read_zip(&bytes, DEFAULT_ATTRIBUTE).unwrap_err();
        assert!(err.to_string().contains("no matching .dbf"), "{err}");
    }

    #[test]
    fn garbage_archive_is_a_zip_error() {
        let err = read_zip(b"definitely not a zip", DEFAULT_ATTRIBUTE).unwrap_err();
        assert!(matches!(err, SpatialError::Zip(_)));
    }

    fn write_square(dir: &Path, id: f64) {
        use shapefile::dbase::{FieldName, Record, TableWriterBuilder};
        use shapefile::{Point, Polygon, PolygonRing};

        std::fs::create_dir_all(dir).unwrap();
        let table = TableWriterBuilder::new()
            .add_numeric_field(FieldName::try_from(DEFAULT_ATTRIBUTE).unwrap(), 10, 0);
        let mut writer = shapefile::Writer::from_path(dir.join("regions.shp"), table).unwrap();

        let square = Polygon::new(PolygonRing::Outer(vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 0.0),
        ]));
        let mut record = Record::default();
        record.insert(DEFAULT_ATTRIBUTE.to_string(), FieldValue::Numeric(Some(id)));
        writer.write_shape_and_record(&square, &record).unwrap();
    }

    #[test]
    fn reads_extracted_directory_and_zipped_copy() {
        let tmp = std::env::temp_dir().join("hab_effort_regions_written");
        let _ = std::fs::remove_dir_all(&tmp);
        write_square(&tmp, 3.0);

        assert!(dir_has_shapefile(&tmp));
        let from_dir = read_dir(&tmp, DEFAULT_ATTRIBUTE).unwrap();
        assert_eq!(from_dir.len(), 1);
        assert_eq!(from_dir[0].id, RegionId(3));

        let shp = std::fs::read(tmp.join("regions.shp")).unwrap();
        let dbf = std::fs::read(tmp.join("regions.dbf")).unwrap();
        let bytes = zip_with(&[
            ("__MACOSX/hab/._regions.shp", b"resource fork".as_slice()),
            ("hab/regions.shp", shp.as_slice()),
            ("hab/regions.dbf", dbf.as_slice()),
        ]);
        let from_zip = read_zip(&bytes, DEFAULT_ATTRIBUTE).unwrap();
        assert_eq!(from_zip, from_dir);

        let err = read_dir(&tmp, "region_id").unwrap_err();
        assert!(err.to_string().contains("region_id"), "{err}");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn empty_directory_has_no_shapefile() {
        let tmp = std::env::temp_dir().join("hab_effort_regions_empty_dir");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        assert!(!dir_has_shapefile(&tmp));
        assert!(matches!(
            read_dir(&tmp, DEFAULT_ATTRIBUTE),
            Err(SpatialError::Malformed { .. })
        ));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parses_region_id_values() {
        assert_eq!(parse_region_id(&FieldValue::Integer(5)), Some(RegionId(5)));
        assert_eq!(
            parse_region_id(&FieldValue::Numeric(Some(13.0))),
            Some(RegionId(13))
        );
        assert_eq!(
            parse_region_id(&FieldValue::Character(Some(" 7 ".to_string()))),
            Some(RegionId(7))
        );
        assert_eq!(parse_region_id(&FieldValue::Numeric(Some(2.5))), None);
        assert_eq!(parse_region_id(&FieldValue::Numeric(None)), None);
        assert_eq!(parse_region_id(&FieldValue::Integer(-1)), None);
        assert_eq!(
            parse_region_id(&FieldValue::Character(Some("EUR".to_string()))),
            None
        );
    }
}
