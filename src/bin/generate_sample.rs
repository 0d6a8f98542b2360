use std::path::Path;

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use phm_ml::data::{write_parquet, Dataset, Field, Record, Value, ValueKind};

const DRIVES: usize = 24;
const DAYS: i64 = 60;
const MODELS: [(&str, i64); 2] = [("ST4000DM000", 4_000_787_030_016), ("ST8000DM002", 8_001_563_222_016)];

/// SMART attributes written as raw/normalized pairs.
const ATTRIBUTES: [u32; 5] = [5, 9, 187, 197, 198];

/// Raw value of `attr` for a drive that has been running `age` days and,
/// if it is going to fail, has `days_left` days to go.
fn smart_raw(attr: u32, age: i64, days_left: Option<i64>, rng: &mut StdRng) -> f64 {
    let wear = match days_left {
        Some(left) if left < 20 => (20 - left) as f64,
        _ => 0.0,
    };
    match attr {
        9 => (age * 24) as f64 + 15_000.0,
        5 | 187 | 197 | 198 => (wear * rng.random_range(0.5..3.0)).round(),
        _ => 0.0,
    }
}

fn main() {
    let mut rng = StdRng::seed_from_u64(42);
    let start = NaiveDate::from_ymd_opt(2017, 1, 1).expect("valid start date");

    let mut fields = vec![
        Field::new("date", ValueKind::Date),
        Field::new("serial_number", ValueKind::Categorical),
        Field::new("model", ValueKind::Categorical),
        Field::new("capacity_bytes", ValueKind::Integer),
        Field::new("failure", ValueKind::Integer),
    ];
    for attr in ATTRIBUTES {
        fields.push(Field::new(format!("smart_{attr}_normalized"), ValueKind::Integer));
        fields.push(Field::new(format!("smart_{attr}_raw"), ValueKind::Float));
    }

    let mut records: Vec<Record> = Vec::new();
    for drive in 0..DRIVES {
        let serial = format!("Z30{:05}", 1000 + drive * 37);
        let (model, capacity) = MODELS[drive % MODELS.len()];
        // every sixth drive fails somewhere in the second half of the window
        let fail_day = (drive % 6 == 0).then(|| rng.random_range(DAYS / 2..DAYS));
        let last_day = fail_day.unwrap_or(DAYS - 1);

        for day in 0..=last_day {
            // drives occasionally miss a daily snapshot
            if day > 0 && day < last_day && rng.random_bool(0.05) {
                continue;
            }
            let days_left = fail_day.map(|f| f - day);
            let mut record = vec![
                Value::Date(start + Duration::days(day)),
                Value::String(serial.clone()),
                Value::from(model),
                Value::Integer(capacity),
                Value::Integer(i64::from(Some(day) == fail_day)),
            ];
            for attr in ATTRIBUTES {
                let raw = smart_raw(attr, day, days_left, &mut rng);
                // older firmware does not report 187
                let missing = (attr == 187 && model == "ST8000DM002") || rng.random_bool(0.01);
                if missing {
                    record.push(Value::Null);
                    record.push(Value::Null);
                } else {
                    record.push(Value::Integer(100 - (raw as i64).min(99)));
                    record.push(Value::Float(raw));
                }
            }
            records.push(record);
        }
    }

    let dataset = Dataset::new(fields, records).expect("generated records match the schema");
    let output_path = Path::new("sample_backblaze.parquet");
    write_parquet(&dataset, output_path).expect("Failed to write parquet file");

    println!(
        "Wrote {} drive-days for {DRIVES} drives to {}",
        dataset.len(),
        output_path.display()
    );
}
