mod returns;
mod watchpoints;
