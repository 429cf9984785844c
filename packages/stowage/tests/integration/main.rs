mod support;

mod destructive;
mod loading;
mod promotion;
mod references;
