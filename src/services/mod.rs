mod seeder;
mod storage;

pub use seeder::seed_websites;
#[cfg(test)]
pub use seeder::site_name;
pub use storage::{ImageStore, SupabaseStorage};
