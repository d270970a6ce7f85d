// Test modules for campus chat
// Each module covers the corresponding source file

mod transport_tests;
