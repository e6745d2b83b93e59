// Authentication helpers
// Token verification only; login and user storage live outside this service.

pub mod jwt;
