pub mod ripple;
