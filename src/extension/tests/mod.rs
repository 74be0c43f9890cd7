pub mod helpers;
mod tests_delete;
mod tests_dispatch;
