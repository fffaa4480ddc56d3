use serde::{Deserialize, Serialize};

use super::error::BandError;

/// A closed interval of neutron wavelengths, in Angstrom.
///
/// Zero-width bands are allowed; the band `[0, 0]` doubles as the result of an empty
/// intersection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WavelengthBand {
    min: f64,
    max: f64,
}

impl WavelengthBand {
    /// Create a new band. Fails if either bound is negative (or NaN) or if min > max
    pub fn new(min: f64, max: f64) -> Result<Self, BandError> {
        if !(min >= 0.0 && max >= 0.0 && min <= max) {
            return Err(BandError::InvalidBand(min, max));
        }
        Ok(Self { min, max })
    }

    /// The degenerate band returned when two bands do not overlap
    pub fn empty() -> Self {
        Self { min: 0.0, max: 0.0 }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Overlap of two bands. A missing overlap, or one that is a single point, gives
    /// the empty band.
    pub fn intersect(&self, other: &WavelengthBand) -> WavelengthBand {
        let lower = self.min.max(other.min);
        let upper = self.max.min(other.max);
        if lower >= upper {
            Self::empty()
        } else {
            Self {
                min: lower,
                max: upper,
            }
        }
    }
}

/// The ordered set of bands transmitted by a chopper (or a combination of choppers).
///
/// Order follows the time at which each band is transmitted. Every member has a
/// strictly positive width.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransmissionBandSet {
    bands: Vec<WavelengthBand>,
}

impl TransmissionBandSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a band, ignoring it if it has no width
    pub fn push(&mut self, band: WavelengthBand) {
        if band.width() > 0.0 {
            self.bands.push(band);
        }
    }

    pub fn bands(&self) -> &[WavelengthBand] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Intersect every member with a single band, keeping the non-empty results
    pub fn intersect_band(&self, band: &WavelengthBand) -> TransmissionBandSet {
        let mut result = TransmissionBandSet::new();
        for member in self.bands.iter() {
            result.push(member.intersect(band));
        }
        result
    }

    /// Intersect this set against every band of another set, concatenating the results.
    ///
    /// A chopper transmits one band per rotation, so two choppers can share several
    /// disjoint bands; this is a cross product, not an element-wise operation.
    pub fn intersect(&self, other: &TransmissionBandSet) -> TransmissionBandSet {
        let mut result = TransmissionBandSet::new();
        for band in other.bands.iter() {
            result.bands.extend(self.intersect_band(band).bands);
        }
        result
    }
}

impl FromIterator<WavelengthBand> for TransmissionBandSet {
    fn from_iter<T: IntoIterator<Item = WavelengthBand>>(iter: T) -> Self {
        let mut set = TransmissionBandSet::new();
        for band in iter {
            set.push(band);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(min: f64, max: f64) -> WavelengthBand {
        WavelengthBand::new(min, max).unwrap()
    }

    #[test]
    fn test_invalid_band() {
        assert_eq!(
            WavelengthBand::new(3.0, 2.0),
            Err(BandError::InvalidBand(3.0, 2.0))
        );
        assert!(WavelengthBand::new(-1.0, 2.0).is_err());
        assert!(WavelengthBand::new(f64::NAN, 2.0).is_err());
        assert_eq!(band(2.0, 2.0).width(), 0.0);
    }

    #[test]
    fn test_intersect_commutes_and_shrinks() {
        let bands = [
            band(0.0, 1.0),
            band(0.5, 4.0),
            band(2.0, 3.0),
            band(3.0, 3.0),
            band(2.5, 10.0),
            band(7.0, 8.0),
        ];
        for a in bands.iter() {
            for b in bands.iter() {
                let ab = a.intersect(b);
                assert_eq!(ab, b.intersect(a));
                assert!(ab.width() <= a.width().min(b.width()));
            }
        }
    }

    #[test]
    fn test_touching_bands_do_not_overlap() {
        assert_eq!(band(1.0, 2.0).intersect(&band(2.0, 3.0)), WavelengthBand::empty());
        assert_eq!(band(1.0, 2.0).intersect(&band(5.0, 6.0)), WavelengthBand::empty());
        assert_eq!(band(1.0, 4.0).intersect(&band(2.0, 3.0)), band(2.0, 3.0));
    }

    #[test]
    fn test_set_intersection_is_cross_product() {
        let first: TransmissionBandSet = [band(1.0, 3.0), band(5.0, 7.0)].into_iter().collect();
        let second: TransmissionBandSet = [band(2.0, 6.0), band(6.5, 9.0)].into_iter().collect();
        let result = first.intersect(&second);
        assert_eq!(
            result.bands(),
            &[band(2.0, 3.0), band(5.0, 6.0), band(6.5, 7.0)]
        );
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_zero_width_bands_are_dropped() {
        let set: TransmissionBandSet = [band(1.0, 1.0), band(1.0, 2.0)].into_iter().collect();
        assert_eq!(set.len(), 1);
        let result = set.intersect_band(&band(2.0, 4.0));
        assert!(result.is_empty());
    }
}
