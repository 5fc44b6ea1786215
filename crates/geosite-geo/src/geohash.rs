//! Geohash encoding used as the geo-cell key of the probability source

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Longest supported geohash
pub const MAX_PRECISION: usize = 12;

/// Encode a WGS 84 position as a geohash of `precision` characters (clamped to 1..=12)
pub fn encode(lat: f64, lon: f64, precision: usize) -> String {
    let precision = precision.clamp(1, MAX_PRECISION);
    let lat = lat.clamp(-90.0, 90.0);
    let lon = lon.clamp(-180.0, 180.0);

    let (mut lat_lo, mut lat_hi) = (-90.0_f64, 90.0_f64);
    let (mut lon_lo, mut lon_hi) = (-180.0_f64, 180.0_f64);

    let mut hash = String::with_capacity(precision);
    let mut even_bit = true;
    let mut bits = 0u8;
    let mut index = 0usize;

    while hash.len() < precision {
        if even_bit {
            let mid = (lon_lo + lon_hi) / 2.0;
            if lon >= mid {
                index = index * 2 + 1;
                lon_lo = mid;
            } else {
                index *= 2;
                lon_hi = mid;
            }
        } else {
            let mid = (lat_lo + lat_hi) / 2.0;
            if lat >= mid {
                index = index * 2 + 1;
                lat_lo = mid;
            } else {
                index *= 2;
                lat_hi = mid;
            }
        }
        even_bit = !even_bit;

        bits += 1;
        if bits == 5 {
            hash.push(BASE32[index] as char);
            bits = 0;
            index = 0;
        }
    }

    hash
}
