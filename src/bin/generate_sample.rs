use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::print_batches;
use parquet::arrow::ArrowWriter;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Log-normal draw, the usual shape of peak intensities.
    fn lognormal(&mut self, mu: f64, sigma: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        (mu + sigma * z).exp()
    }
}

/// CcHhOo formula for a synthetic compound index.
fn formula(i: usize) -> String {
    let c = 4 + i % 20;
    let h = 2 * c - (i % 5) * 2 + 2;
    let o = 1 + i % 7;
    format!("C{c}H{h}O{o}")
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);

    let groups = ["control", "treated"];
    let sample_columns = ["s1", "s2", "s3", "s4"];
    let blank_columns = ["blank1", "blank2"];
    let n_compounds = 300;

    let mut names = Vec::with_capacity(n_compounds);
    let mut group_labels = Vec::with_capacity(n_compounds);
    let mut formulas = Vec::with_capacity(n_compounds);
    let mut samples: Vec<Vec<f64>> = vec![Vec::with_capacity(n_compounds); sample_columns.len()];
    let mut blanks: Vec<Vec<f64>> = vec![Vec::with_capacity(n_compounds); blank_columns.len()];

    for i in 0..n_compounds {
        names.push(format!("cmpd_{i:04}"));
        group_labels.push(groups[i % groups.len()].to_string());
        formulas.push(formula(i));

        let level = rng.lognormal(6.0, 1.5);
        for column in samples.iter_mut() {
            column.push(level * rng.lognormal(0.0, 0.2));
        }
        // One compound in six is a contaminant that shows up in the blanks.
        let contaminated = i % 6 == 0;
        for column in blanks.iter_mut() {
            let value = if contaminated {
                level * rng.lognormal(-0.3, 0.2)
            } else if rng.next_f64() < 0.7 {
                0.0
            } else {
                rng.lognormal(1.0, 0.5)
            };
            column.push(value);
        }
    }

    let mut fields = vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("group", DataType::Utf8, false),
        Field::new("formula", DataType::Utf8, false),
    ];
    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(names)),
        Arc::new(StringArray::from(group_labels)),
        Arc::new(StringArray::from(formulas)),
    ];
    for (name, values) in sample_columns
        .iter()
        .zip(samples)
        .chain(blank_columns.iter().zip(blanks))
    {
        fields.push(Field::new(*name, DataType::Float64, false));
        arrays.push(Arc::new(Float64Array::from(values)));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch =
        RecordBatch::try_new(schema.clone(), arrays).context("Failed to create RecordBatch")?;

    let output_path = "sample_compounds.parquet";
    let file = std::fs::File::create(output_path).context("Failed to create output file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("Failed to create writer")?;
    writer.write(&batch).context("Failed to write batch")?;
    writer.close().context("Failed to close writer")?;

    print_batches(&[batch.slice(0, 5)]).context("printing preview")?;
    println!("Wrote {n_compounds} compounds to {output_path}");
    Ok(())
}
