mod download;
mod run;
