mod csv_export;
mod dataset_json;

pub use csv_export::{
    read_spectrum_csv,
    read_spectrum_csv_from,
    write_metadata_csv,
    write_metadata_csv_to,
    write_spectrum_csv,
    write_spectrum_csv_to,
};
pub use dataset_json::{
    JsonDataset,
    JsonPixel,
    read_json_dataset,
};
