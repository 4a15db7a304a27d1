// container for blender installation and the process that renders with it
pub mod blender;

// argument, region and output format types handed to blender
pub mod models;
