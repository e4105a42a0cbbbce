// Test modules for Natmon
// Each module covers the public API of the corresponding source module

mod supervisor_tests;
