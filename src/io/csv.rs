/*!
# Saving Chains to CSV

Enable via the `csv` feature.
*/

use csv::Writer;
use ndarray::{Array2, Axis};
use std::error::Error;
use std::fs::File;
use std::path::Path;

/**
Saves a chain as a CSV file.

The data is expected to be in a shape of **sample × dimension**, e.g. the output of
[`ChainDriver::to_array`](crate::metropolis_hastings::ChainDriver::to_array).

The resulting CSV file has a header row `sample, dim_0, dim_1, …` followed by one row per
sample.

# Examples

```rust
use polytope_mcmc::io::csv::save_csv;
use ndarray::arr2;

let chain = arr2(&[[-0.1, -0.1], [1.7, -0.1], [1.7, 0.9]]);
let path = std::env::temp_dir().join("polytope_mcmc_doc.csv");
save_csv(&chain, &path)?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub fn save_csv<T: std::fmt::Display>(
    data: &Array2<T>,
    filename: impl AsRef<Path>,
) -> Result<(), Box<dyn Error>> {
    let mut wtr = Writer::from_writer(File::create(filename)?);
    let n_dims = data.ncols();

    let mut header = vec!["sample".to_string()];
    header.extend((0..n_dims).map(|i| format!("dim_{}", i)));
    wtr.write_record(&header)?;

    for (sample_idx, sample) in data.axis_iter(Axis(0)).enumerate() {
        let mut row = vec![sample_idx.to_string()];
        row.extend(sample.iter().map(|v| v.to_string()));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}
