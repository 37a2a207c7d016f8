// data module
pub mod data {
    pub mod cube;
    pub mod region;
}

// flagging module
pub mod flagging {
    pub mod mapper;
    pub mod lines;
    pub mod scan;
}

// mapping module
pub mod mapping {
    pub mod index;
}

// algorithm module
pub mod algorithm {
    pub mod gridmap;
    pub mod pca;
}

pub mod session;
pub mod error;
