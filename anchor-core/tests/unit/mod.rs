mod locks;
mod records;
mod resource_pool;
mod storage;
