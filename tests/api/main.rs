mod bootstrap;
mod helpers;
mod signup;
