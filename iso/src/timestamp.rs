// The two on-disc timestamp encodings: the 17-byte decimal-ASCII form used
// in volume descriptors (ECMA-119 8.4.26.1) and the 7-byte binary form used
// in directory records (ECMA-119 9.1.5). Offsets are counted in 15-minute
// steps from GMT in both.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike};
use discus_core::{DiscusError, DiscusResult};

/// Seconds per offset step.
const OFFSET_UNIT_SECS: i32 = 15 * 60;

/// Volume-descriptor timestamp. An all-zero value is the format's explicit
/// "not set" sentinel and round-trips as such.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VolumeTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hundredth: u8,
    /// Offset from GMT in 15-minute units.
    pub offset: i8,
}

impl VolumeTimestamp {
    pub const ENCODED_LEN: usize = 17;

    /// The unset sentinel.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_unset(&self) -> bool {
        *self == Self::default()
    }

    pub fn from_datetime(dt: &DateTime<FixedOffset>) -> Self {
        Self {
            year: dt.year() as u16,
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
            hundredth: (dt.timestamp_subsec_millis() / 10) as u8,
            offset: (dt.offset().local_minus_utc() / OFFSET_UNIT_SECS) as i8,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let digits = format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.hundredth
        );
        out.extend_from_slice(digits.as_bytes());
        out.push(self.offset as u8);
    }

    pub fn decode(buf: &[u8]) -> DiscusResult<Self> {
        if buf.len() < Self::ENCODED_LEN {
            return Err(DiscusError::UnexpectedEof);
        }
        Ok(Self {
            year: parse_digits(&buf[0..4])? as u16,
            month: parse_digits(&buf[4..6])? as u8,
            day: parse_digits(&buf[6..8])? as u8,
            hour: parse_digits(&buf[8..10])? as u8,
            minute: parse_digits(&buf[10..12])? as u8,
            second: parse_digits(&buf[12..14])? as u8,
            hundredth: parse_digits(&buf[14..16])? as u8,
            offset: buf[16] as i8,
        })
    }
}

fn parse_digits(field: &[u8]) -> DiscusResult<u32> {
    let mut value = 0u32;
    for &b in field {
        if !b.is_ascii_digit() {
            return Err(DiscusError::BadTimestamp(format!(
                "non-digit byte {b:#04x} in numeric field"
            )));
        }
        value = value * 10 + (b - b'0') as u32;
    }
    Ok(value)
}

/// Directory-record timestamp: a point in time carrying its recording zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingTimestamp(pub DateTime<FixedOffset>);

impl RecordingTimestamp {
    pub const ENCODED_LEN: usize = 7;

    pub fn now() -> Self {
        Self(chrono::Local::now().fixed_offset())
    }

    /// The year field is a single byte counted from 1900.
    pub fn encode(&self, out: &mut Vec<u8>) -> DiscusResult<()> {
        let dt = &self.0;
        let year = dt.year();
        if !(1900..=2155).contains(&year) {
            return Err(DiscusError::BadTimestamp(format!(
                "year {year} is outside the recordable range 1900-2155"
            )));
        }
        out.push((year - 1900) as u8);
        out.push(dt.month() as u8);
        out.push(dt.day() as u8);
        out.push(dt.hour() as u8);
        out.push(dt.minute() as u8);
        out.push(dt.second() as u8);
        out.push((dt.offset().local_minus_utc() / OFFSET_UNIT_SECS) as u8);
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> DiscusResult<Self> {
        if buf.len() < Self::ENCODED_LEN {
            return Err(DiscusError::UnexpectedEof);
        }
        let offset_secs = (buf[6] as i8) as i32 * OFFSET_UNIT_SECS;
        let zone = FixedOffset::east_opt(offset_secs).ok_or_else(|| {
            DiscusError::BadTimestamp(format!("offset {} out of range", buf[6] as i8))
        })?;
        let date = NaiveDate::from_ymd_opt(1900 + buf[0] as i32, buf[1] as u32, buf[2] as u32)
            .ok_or_else(|| {
                DiscusError::BadTimestamp(format!(
                    "invalid date {:04}-{:02}-{:02}",
                    1900 + buf[0] as i32,
                    buf[1],
                    buf[2]
                ))
            })?;
        let naive = date
            .and_hms_opt(buf[3] as u32, buf[4] as u32, buf[5] as u32)
            .ok_or_else(|| {
                DiscusError::BadTimestamp(format!(
                    "invalid time {:02}:{:02}:{:02}",
                    buf[3], buf[4], buf[5]
                ))
            })?;
        let dt = naive
            .and_local_timezone(zone)
            .single()
            .ok_or_else(|| DiscusError::BadTimestamp("unrepresentable local time".into()))?;
        Ok(Self(dt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn volume_timestamp_round_trip() {
        let ts = VolumeTimestamp {
            year: 2018,
            month: 6,
            day: 1,
            hour: 3,
            minute: 12,
            second: 50,
            hundredth: 7,
            offset: 8,
        };

        let mut buf = Vec::new();
        ts.encode(&mut buf);
        assert_eq!(buf.len(), VolumeTimestamp::ENCODED_LEN);
        assert_eq!(&buf[..16], b"2018060103125007");
        assert_eq!(VolumeTimestamp::decode(&buf).unwrap(), ts);
    }

    #[test]
    fn volume_timestamp_zero_sentinel() {
        let mut buf = Vec::new();
        VolumeTimestamp::zero().encode(&mut buf);
        assert_eq!(&buf[..16], b"0000000000000000");
        assert_eq!(buf[16], 0);

        let decoded = VolumeTimestamp::decode(&buf).unwrap();
        assert!(decoded.is_unset());
    }

    #[test]
    fn volume_timestamp_rejects_non_digit() {
        let mut buf = Vec::new();
        VolumeTimestamp::zero().encode(&mut buf);
        buf[5] = b'x';
        assert!(matches!(
            VolumeTimestamp::decode(&buf),
            Err(DiscusError::BadTimestamp(_))
        ));
    }

    #[test]
    fn recording_timestamp_round_trip() {
        let zone = FixedOffset::east_opt(2 * 3600).unwrap();
        let dt = zone.with_ymd_and_hms(2018, 7, 25, 22, 1, 2).unwrap();

        let mut buf = Vec::new();
        RecordingTimestamp(dt).encode(&mut buf).unwrap();
        assert_eq!(buf, vec![118, 7, 25, 22, 1, 2, 8]);

        let decoded = RecordingTimestamp::decode(&buf).unwrap();
        assert_eq!(decoded.0, dt);
        assert_eq!(decoded.0.offset().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn recording_timestamp_rejects_out_of_range_year() {
        let zone = FixedOffset::east_opt(0).unwrap();
        for year in [1899, 2156] {
            let dt = zone.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap();
            let mut buf = Vec::new();
            assert!(matches!(
                RecordingTimestamp(dt).encode(&mut buf),
                Err(DiscusError::BadTimestamp(_))
            ));
        }
    }

    #[test]
    fn recording_timestamp_rejects_garbage_date() {
        // month 13
        let buf = [118, 13, 25, 22, 1, 2, 8];
        assert!(matches!(
            RecordingTimestamp::decode(&buf),
            Err(DiscusError::BadTimestamp(_))
        ));
    }
}
