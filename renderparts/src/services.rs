pub mod blender_renderer;
pub mod grid_partitioner;
pub mod image_reassembler;
pub mod render_scheduler;
pub mod tile_inventory;
