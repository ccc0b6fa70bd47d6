mod arrays;

pub use arrays::{
    Array2D,
    IonImage,
};
