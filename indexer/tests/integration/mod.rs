mod failures_test;
mod indexing_test;
mod skewed_strings_test;
