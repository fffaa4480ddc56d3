//! Binary per-pixel event files.
//!
//! All values are little-endian. The header is the magic `EQEV`, a u16 format version
//! and the u32 number of pixels. Each pixel follows as a u64 event count and then that
//! many records of `tof: f64` (microseconds) and `pulse_time: i64` (nanoseconds).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use super::constants::{EVENT_FILE_MAGIC, EVENT_FILE_VERSION};
use super::error::EventFileError;
use super::event::{EventList, NeutronEvent};

/// Upper bound on the capacity reserved up front for one pixel
const MAX_PREALLOCATED_EVENTS: u64 = 1 << 20;

/// Read all pixels of an event file
pub fn read_event_file(path: &Path) -> Result<Vec<EventList>, EventFileError> {
    if !path.exists() {
        return Err(EventFileError::BadFilePath(path.to_path_buf()));
    }
    let mut reader = BufReader::new(File::open(path)?);
    read_events(&mut reader)
}

/// Read an event file, requiring it to hold exactly `expected` pixels
pub fn read_event_file_for(path: &Path, expected: usize) -> Result<Vec<EventList>, EventFileError> {
    let pixels = read_event_file(path)?;
    if pixels.len() != expected {
        return Err(EventFileError::PixelOutOfRange {
            found: pixels.len(),
            expected,
        });
    }
    Ok(pixels)
}

/// Write the pixels to an event file, replacing any existing file
pub fn write_event_file(path: &Path, pixels: &[EventList]) -> Result<(), EventFileError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_events(&mut writer, pixels)?;
    writer.flush()?;
    Ok(())
}

pub fn read_events<R: Read>(reader: &mut R) -> Result<Vec<EventList>, EventFileError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != EVENT_FILE_MAGIC {
        return Err(EventFileError::BadMagic(magic));
    }
    let version = reader.read_u16::<LittleEndian>()?;
    if version != EVENT_FILE_VERSION {
        return Err(EventFileError::UnsupportedVersion(version));
    }
    let n_pixels = reader.read_u32::<LittleEndian>()? as usize;

    let mut pixels = Vec::with_capacity(n_pixels);
    for idx in 0..n_pixels {
        let events = read_pixel(reader).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => EventFileError::TruncatedRecord(idx),
            _ => EventFileError::IOError(e),
        })?;
        pixels.push(EventList::new(events));
    }
    Ok(pixels)
}

fn read_pixel<R: Read>(reader: &mut R) -> Result<Vec<NeutronEvent>, std::io::Error> {
    let n_events = reader.read_u64::<LittleEndian>()?;
    let mut events = Vec::with_capacity(n_events.min(MAX_PREALLOCATED_EVENTS) as usize);
    for _ in 0..n_events {
        let tof = reader.read_f64::<LittleEndian>()?;
        let pulse_time = reader.read_i64::<LittleEndian>()?;
        events.push(NeutronEvent::new(tof, pulse_time));
    }
    Ok(events)
}

/// Pixel count as stored in the header
fn pixel_count(n_pixels: usize) -> Result<u32, EventFileError> {
    u32::try_from(n_pixels).map_err(|_| EventFileError::TooManyPixels(n_pixels))
}

pub fn write_events<W: Write>(writer: &mut W, pixels: &[EventList]) -> Result<(), EventFileError> {
    let n_pixels = pixel_count(pixels.len())?;
    writer.write_all(EVENT_FILE_MAGIC)?;
    writer.write_u16::<LittleEndian>(EVENT_FILE_VERSION)?;
    writer.write_u32::<LittleEndian>(n_pixels)?;
    for pixel in pixels {
        writer.write_u64::<LittleEndian>(pixel.len() as u64)?;
        for event in pixel.events() {
            writer.write_f64::<LittleEndian>(event.tof)?;
            writer.write_i64::<LittleEndian>(event.pulse_time)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pixels() -> Vec<EventList> {
        vec![
            EventList::new(vec![
                NeutronEvent::new(1500.25, 1_700_000_000_000_000_000),
                NeutronEvent::new(16000.0, 1_700_000_000_016_666_667),
            ]),
            EventList::default(),
            EventList::new(vec![NeutronEvent::new(-3.5, -1)]),
        ]
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.eqev");
        let pixels = sample_pixels();
        write_event_file(&path, &pixels).unwrap();
        assert_eq!(read_event_file(&path).unwrap(), pixels);
        assert_eq!(read_event_file_for(&path, 3).unwrap(), pixels);
        assert!(matches!(
            read_event_file_for(&path, 4),
            Err(EventFileError::PixelOutOfRange {
                found: 3,
                expected: 4
            })
        ));
    }

    #[test]
    fn test_header_layout() {
        let mut bytes = Vec::new();
        write_events(&mut bytes, &[EventList::new(vec![NeutronEvent::new(1.0, 2)])]).unwrap();
        assert_eq!(&bytes[0..4], b"EQEV");
        assert_eq!(&bytes[4..6], &[1, 0]);
        assert_eq!(&bytes[6..10], &[1, 0, 0, 0]);
        assert_eq!(&bytes[10..18], &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[18..26], &1.0f64.to_le_bytes());
        assert_eq!(&bytes[26..34], &2i64.to_le_bytes());
        assert_eq!(bytes.len(), 34);
    }

    #[test]
    fn test_pixel_count_limit() {
        assert_eq!(pixel_count(3).unwrap(), 3);
        assert_eq!(pixel_count(u32::MAX as usize).unwrap(), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_too_many_pixels() {
        let n_pixels = u32::MAX as usize + 1;
        assert!(matches!(
            pixel_count(n_pixels),
            Err(EventFileError::TooManyPixels(n)) if n == n_pixels
        ));
    }

    #[test]
    fn test_truncated_file() {
        let mut bytes = Vec::new();
        write_events(&mut bytes, &sample_pixels()).unwrap();
        // Cut into the last record of the first pixel
        bytes.truncate(10 + 8 + 16 + 4);
        let result = read_events(&mut bytes.as_slice());
        assert!(matches!(result, Err(EventFileError::TruncatedRecord(0))));
    }

    #[test]
    fn test_bad_header() {
        let mut bytes = Vec::new();
        write_events(&mut bytes, &sample_pixels()).unwrap();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            read_events(&mut bad_magic.as_slice()),
            Err(EventFileError::BadMagic(m)) if &m == b"XQEV"
        ));

        let mut bad_version = bytes.clone();
        bad_version[4] = 7;
        assert!(matches!(
            read_events(&mut bad_version.as_slice()),
            Err(EventFileError::UnsupportedVersion(7))
        ));

        assert!(matches!(
            read_event_file(Path::new("/no/such/events.eqev")),
            Err(EventFileError::BadFilePath(_))
        ));
    }
}
