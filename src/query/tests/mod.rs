pub mod helpers;
mod tests_knn;
