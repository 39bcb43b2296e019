mod helpers;
mod scheduler;
mod watcher;
