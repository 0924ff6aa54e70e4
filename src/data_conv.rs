use std::fs;
use std::path::{Path};

use serde_json as sj;

use crate::error::*;
use crate::records::*;

// Conversion between records and their JSON representation. Field
// elements are arrays of limbs, pairs are arrays of two field elements.
pub trait JsonRecord : Sized {
    fn from_json(j : &sj::Value) -> Result<Self>;

    fn to_json(&self) -> sj::Value;
}

impl JsonRecord for Fe25519 {
    fn from_json(j : &sj::Value) -> Result<Self> {
        let sj::Value::Array(limbs) = j else {
            return Err(Error::Config(format!("Expected array of limbs, got: {j}")));
        };

        if limbs.len() != LIMB_COUNT {
            return Err(Error::Config(format!("Expected {LIMB_COUNT} limbs, got {}", limbs.len())));
        }

        let mut value = [0i32; LIMB_COUNT];

        for (dst, src) in value.iter_mut().zip(limbs) {
            *dst = src.as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| Error::Config(format!("Invalid limb: {src}")))?;
        }

        Ok(Fe25519::new(value))
    }

    fn to_json(&self) -> sj::Value {
        sj::Value::Array(self.value.iter().map(|&n| sj::Value::from(n)).collect())
    }
}

impl JsonRecord for DoubleFe25519 {
    fn from_json(j : &sj::Value) -> Result<Self> {
        if let sj::Value::Array(pair) = j &&
                let [a, b] = &pair[..] {
            Ok(DoubleFe25519::new(Fe25519::from_json(a)?, Fe25519::from_json(b)?))
        } else {
            Err(Error::Config(format!("Expected pair of field elements, got: {j}")))
        }
    }

    fn to_json(&self) -> sj::Value {
        sj::Value::Array(self.value.iter().map(|v| v.to_json()).collect())
    }
}


pub fn records_from_json<T : JsonRecord>(j : &sj::Value) -> Result<Vec<T>> {
    let sj::Value::Array(records) = j else {
        return Err(Error::Config("Expected array of records.".to_string()));
    };

    records.iter().map(|r| T::from_json(r)).collect()
}

pub fn records_to_json<T : JsonRecord>(records : &[T]) -> sj::Value {
    sj::Value::Array(records.iter().map(|r| r.to_json()).collect())
}

// Reads input records from a JSON file
pub fn load_records<T : JsonRecord>(path : &Path) -> Result<Vec<T>> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

    let json : sj::Value = sj::from_str(&text).map_err(
        |e| Error::Config(format!("{}: {}", path.display(), e)))?;

    records_from_json(&json)
}

// Writes output records to a JSON file
pub fn store_records<T : JsonRecord>(path : &Path, records : &[T]) -> Result<()> {
    let text = sj::to_string_pretty(&records_to_json(records)).map_err(
        |e| Error::Config(format!("Failed to serialize records: {e}")))?;

    fs::write(path, text).map_err(|e| Error::io(path, e))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_input_pairs() {
        let json = sj::json!([
            [[10, 11, 12, 13, 14, 15, 16, 17, 18, 19], [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]],
            [[-1, 0, 0, 0, 0, 0, 0, 0, 0, 2147483647], [0, 0, 0, 0, 0, 0, 0, 0, 0, 0]],
        ]);

        let records : Vec<DoubleFe25519> = records_from_json(&json).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0], DoubleFe25519::test_pattern());
        assert_eq!(records[1].value[0].value[0], -1);
        assert_eq!(records[1].value[0].value[9], i32::MAX);
    }

    #[test]
    fn rejects_wrong_limb_count_and_range() {
        let short = sj::json!([[1, 2, 3]]);
        assert!(records_from_json::<Fe25519>(&short).is_err());

        let wide = sj::json!([[4294967296i64, 0, 0, 0, 0, 0, 0, 0, 0, 0]]);
        assert!(records_from_json::<Fe25519>(&wide).is_err());

        let single = sj::json!([[[0, 0, 0, 0, 0, 0, 0, 0, 0, 0]]]);
        assert!(records_from_json::<DoubleFe25519>(&single).is_err());
    }

    #[test]
    fn outputs_serialize_as_limb_arrays() {
        let json = records_to_json(&[Fe25519::sequence(3)]);
        assert_eq!(json, sj::json!([[3, 4, 5, 6, 7, 8, 9, 10, 11, 12]]));
    }
}
