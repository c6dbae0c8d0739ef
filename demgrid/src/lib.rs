//! Single-band elevation rasters for point sampling.
//!
//! Two on-disk formats are supported:
//!
//! 1. ESRI ASCII grid (`.asc`), the plain-text interchange format
//!    emitted by most hydrographic processing packages.
//! 1. GeoTIFF (`.tif`/`.tiff`), read with the pure-Rust [tiff] crate.
//!    The affine geotransform is assembled from the ModelPixelScale
//!    and ModelTiepoint tags; the no-data sentinel from GDAL's ASCII
//!    tag when present.
//!
//! Either way the raster ends up as an in-memory [`Grid`] of `f64`
//! samples queried by world coordinate.

mod error;

pub use crate::error::DemGridError;
use geo::geometry::Coord;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use tiff::{
    decoder::{Decoder, DecodingResult},
    tags::Tag,
};

/// Base floating point type used for all coordinates and samples.
pub type C = f64;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GDAL_NODATA: u16 = 42113;

/// Affine transform between world coordinates and pixel indices.
///
/// North-up rasters only: `origin` is the outer corner of the
/// top-left pixel, rows advance south.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// World X of the raster's top-left outer corner.
    pub origin_x: C,

    /// World Y of the raster's top-left outer corner.
    pub origin_y: C,

    /// Pixel width in world units (positive).
    pub pixel_w: C,

    /// Pixel height in world units (positive).
    pub pixel_h: C,
}

impl GeoTransform {
    /// Returns the pixel indices containing `coord`.
    ///
    /// Indices may be negative or beyond the raster's dimensions;
    /// bounds checking is the caller's concern.
    pub fn index(&self, coord: Coord<C>) -> (isize, isize) {
        #[allow(clippy::cast_possible_truncation)]
        let col = ((coord.x - self.origin_x) / self.pixel_w).floor() as isize;
        #[allow(clippy::cast_possible_truncation)]
        let row = ((self.origin_y - coord.y) / self.pixel_h).floor() as isize;
        (col, row)
    }

    /// Returns the world coordinate of the center of pixel `(col, row)`.
    pub fn center(&self, (col, row): (usize, usize)) -> Coord<C> {
        #[allow(clippy::cast_precision_loss)]
        Coord {
            x: self.origin_x + (col as C + 0.5) * self.pixel_w,
            y: self.origin_y - (row as C + 0.5) * self.pixel_h,
        }
    }
}

pub struct Grid {
    /// Number of (columns, rows) in this grid.
    dimensions: (usize, usize),

    /// World-to-pixel transform.
    transform: GeoTransform,

    /// Sentinel value meaning "no measurement", if declared.
    nodata: Option<C>,

    /// Samples, row-major from the top (northernmost) row.
    samples: Box<[C]>,
}

impl Grid {
    /// Opens the raster at `path`, dispatching on its extension.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DemGridError> {
        let path = path.as_ref();
        match path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("asc") => Self::from_ascii(path),
            Some("tif" | "tiff") => Self::from_geotiff(path),
            _ => Err(DemGridError::Extension(path.to_owned())),
        }
    }

    /// Reads an ESRI ASCII grid from `path`.
    pub fn from_ascii<P: AsRef<Path>>(path: P) -> Result<Self, DemGridError> {
        let reader = BufReader::new(File::open(path)?);
        Self::from_ascii_reader(reader)
    }

    /// Reads an ESRI ASCII grid from any buffered reader.
    ///
    /// Header keys are case-insensitive. Both `xllcorner`/`yllcorner`
    /// and `xllcenter`/`yllcenter` origin conventions are accepted;
    /// `nodata_value` is optional.
    pub fn from_ascii_reader<R: BufRead>(reader: R) -> Result<Self, DemGridError> {
        let mut ncols = None;
        let mut nrows = None;
        let mut xll = None;
        let mut yll = None;
        let mut cellsize = None;
        let mut nodata = None;
        let mut x_is_center = false;
        let mut y_is_center = false;
        let mut samples = Vec::new();

        for line in reader.lines() {
            let line = line?;
            let mut tokens = line.split_whitespace();
            let Some(first) = tokens.next() else {
                continue;
            };
            if first.parse::<C>().is_ok() {
                for token in line.split_whitespace() {
                    let value = token
                        .parse::<C>()
                        .map_err(|_| DemGridError::AsciiHeader(format!("bad sample {token}")))?;
                    samples.push(value);
                }
                continue;
            }
            let value = tokens
                .next()
                .and_then(|token| token.parse::<C>().ok())
                .ok_or_else(|| DemGridError::AsciiHeader(line.clone()))?;
            match first.to_ascii_lowercase().as_str() {
                "ncols" => ncols = Some(value),
                "nrows" => nrows = Some(value),
                "xllcorner" => xll = Some(value),
                "xllcenter" => {
                    xll = Some(value);
                    x_is_center = true;
                }
                "yllcorner" => yll = Some(value),
                "yllcenter" => {
                    yll = Some(value);
                    y_is_center = true;
                }
                "cellsize" => cellsize = Some(value),
                "nodata_value" => nodata = Some(value),
                other => {
                    return Err(DemGridError::AsciiHeader(format!("unknown key {other}")));
                }
            }
        }

        let (Some(ncols), Some(nrows), Some(mut xll), Some(mut yll), Some(cellsize)) =
            (ncols, nrows, xll, yll, cellsize)
        else {
            return Err(DemGridError::AsciiHeader("incomplete header".to_string()));
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let dimensions = (ncols as usize, nrows as usize);
        if samples.len() != dimensions.0 * dimensions.1 {
            return Err(DemGridError::SampleCount {
                expected: dimensions.0 * dimensions.1,
                actual: samples.len(),
            });
        }

        if x_is_center {
            xll -= cellsize / 2.0;
        }
        if y_is_center {
            yll -= cellsize / 2.0;
        }

        #[allow(clippy::cast_precision_loss)]
        let transform = GeoTransform {
            origin_x: xll,
            origin_y: yll + dimensions.1 as C * cellsize,
            pixel_w: cellsize,
            pixel_h: cellsize,
        };

        Ok(Self {
            dimensions,
            transform,
            nodata,
            samples: samples.into_boxed_slice(),
        })
    }

    /// Reads the first image of a GeoTIFF at `path`.
    pub fn from_geotiff<P: AsRef<Path>>(path: P) -> Result<Self, DemGridError> {
        let path = path.as_ref();
        let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
        let (cols, rows) = decoder.dimensions()?;
        let dimensions = (cols as usize, rows as usize);

        let transform = {
            let scale = decoder
                .get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE))
                .map_err(|_| DemGridError::NoGeoTransform(path.to_owned()))?;
            let tiepoint = decoder
                .get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT))
                .map_err(|_| DemGridError::NoGeoTransform(path.to_owned()))?;
            if scale.len() < 2 || tiepoint.len() < 5 {
                return Err(DemGridError::NoGeoTransform(path.to_owned()));
            }
            // Tiepoint maps raster (i, j) onto world (x, y).
            GeoTransform {
                origin_x: tiepoint[3] - tiepoint[0] * scale[0],
                origin_y: tiepoint[4] + tiepoint[1] * scale[1].abs(),
                pixel_w: scale[0],
                pixel_h: scale[1].abs(),
            }
        };

        let nodata = decoder
            .get_tag_ascii_string(Tag::Unknown(GDAL_NODATA))
            .ok()
            .and_then(|s| s.trim().trim_end_matches('\0').parse::<C>().ok());

        let samples: Vec<C> = match decoder.read_image()? {
            DecodingResult::U8(v) => v.into_iter().map(C::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(C::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(C::from).collect(),
            DecodingResult::I8(v) => v.into_iter().map(C::from).collect(),
            DecodingResult::I16(v) => v.into_iter().map(C::from).collect(),
            DecodingResult::I32(v) => v.into_iter().map(C::from).collect(),
            DecodingResult::F32(v) => v.into_iter().map(C::from).collect(),
            DecodingResult::F64(v) => v,
            _ => return Err(DemGridError::SampleFormat(path.to_owned())),
        };

        if samples.len() != dimensions.0 * dimensions.1 {
            return Err(DemGridError::SampleCount {
                expected: dimensions.0 * dimensions.1,
                actual: samples.len(),
            });
        }

        Ok(Self {
            dimensions,
            transform,
            nodata,
            samples: samples.into_boxed_slice(),
        })
    }

    /// Builds a grid from already-decoded parts.
    pub fn from_parts(
        dimensions: (usize, usize),
        transform: GeoTransform,
        nodata: Option<C>,
        samples: Vec<C>,
    ) -> Result<Self, DemGridError> {
        if samples.len() != dimensions.0 * dimensions.1 {
            return Err(DemGridError::SampleCount {
                expected: dimensions.0 * dimensions.1,
                actual: samples.len(),
            });
        }
        Ok(Self {
            dimensions,
            transform,
            nodata,
            samples: samples.into_boxed_slice(),
        })
    }

    /// Returns the number of (columns, rows) in this grid.
    pub fn dimensions(&self) -> (usize, usize) {
        self.dimensions
    }

    /// Returns this grid's affine transform.
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Returns this grid's no-data sentinel, if declared.
    pub fn nodata(&self) -> Option<C> {
        self.nodata
    }

    /// Returns the valid sample whose pixel contains `coord`.
    ///
    /// `None` when the coordinate falls outside the raster or its
    /// pixel holds no measurement.
    pub fn get(&self, coord: Coord<C>) -> Option<C> {
        let (col, row) = self.transform.index(coord);
        self.get_xy((col, row)).filter(|v| self.is_valid(*v))
    }

    /// Returns the valid sample nearest `coord` within `radius_m`.
    ///
    /// The window spans `ceil(radius_m / pixel_w)` columns and
    /// `ceil(radius_m / pixel_h)` rows around the pixel containing
    /// `coord`, so non-square pixels reach the same ground distance
    /// on both axes. Candidates are ranked by the world distance of
    /// their pixel-center offsets; equally distant candidates resolve
    /// to the first in lexicographic `(row, col)` offset order, which
    /// makes the search fully deterministic.
    pub fn nearest_valid(&self, coord: Coord<C>, radius_m: C) -> Option<C> {
        let (col, row) = self.transform.index(coord);
        #[allow(clippy::cast_possible_truncation)]
        let radius_cols = (radius_m / self.transform.pixel_w).ceil() as isize;
        #[allow(clippy::cast_possible_truncation)]
        let radius_rows = (radius_m / self.transform.pixel_h).ceil() as isize;

        let mut best: Option<(C, C)> = None;
        for dy in -radius_rows..=radius_rows {
            for dx in -radius_cols..=radius_cols {
                let Some(value) = self.get_xy((col + dx, row + dy)) else {
                    continue;
                };
                if !self.is_valid(value) {
                    continue;
                }
                #[allow(clippy::cast_precision_loss)]
                let distance = ((dx as C * self.transform.pixel_w).powi(2)
                    + (dy as C * self.transform.pixel_h).powi(2))
                .sqrt();
                match best {
                    Some((best_distance, _)) if best_distance <= distance => {}
                    _ => best = Some((distance, value)),
                }
            }
        }
        best.map(|(_, value)| value)
    }

    /// Returns the elevation at `coord`, falling back to the nearest
    /// valid neighbor within `radius_m` when the containing pixel
    /// holds no measurement.
    pub fn sample(&self, coord: Coord<C>, radius_m: C) -> Option<C> {
        self.get(coord)
            .or_else(|| self.nearest_valid(coord, radius_m))
    }
}

/// Private API
impl Grid {
    fn get_xy(&self, (col, row): (isize, isize)) -> Option<C> {
        #[allow(clippy::cast_possible_wrap)]
        if 0 <= col
            && col < self.dimensions.0 as isize
            && 0 <= row
            && row < self.dimensions.1 as isize
        {
            #[allow(clippy::cast_sign_loss)]
            let idx = row as usize * self.dimensions.0 + col as usize;
            Some(self.samples[idx])
        } else {
            None
        }
    }

    fn is_valid(&self, value: C) -> bool {
        !value.is_nan() && Some(value) != self.nodata
    }
}
