use clap::Parser;
use mnist_softmax::cli::Cli;

#[cfg(any(
    feature = "ndarray",
    feature = "ndarray-blas-netlib",
    feature = "ndarray-blas-openblas",
    feature = "ndarray-blas-accelerate",
))]
mod ndarray {
    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };
    use mnist_softmax::cli::{execute, Cli};

    pub fn run(cli: Cli) -> anyhow::Result<()> {
        let device = NdArrayDevice::Cpu;
        execute::<Autodiff<NdArray>>(cli, device)
    }
}

#[cfg(feature = "tch-gpu")]
mod tch_gpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };
    use mnist_softmax::cli::{execute, Cli};

    pub fn run(cli: Cli) -> anyhow::Result<()> {
        #[cfg(not(target_os = "macos"))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(target_os = "macos")]
        let device = LibTorchDevice::Mps;

        execute::<Autodiff<LibTorch>>(cli, device)
    }
}

#[cfg(feature = "tch-cpu")]
mod tch_cpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };
    use mnist_softmax::cli::{execute, Cli};

    pub fn run(cli: Cli) -> anyhow::Result<()> {
        execute::<Autodiff<LibTorch>>(cli, LibTorchDevice::Cpu)
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use burn::backend::{
        wgpu::{Wgpu, WgpuDevice},
        Autodiff,
    };
    use mnist_softmax::cli::{execute, Cli};

    pub fn run(cli: Cli) -> anyhow::Result<()> {
        execute::<Autodiff<Wgpu>>(cli, WgpuDevice::default())
    }
}

#[allow(unreachable_code, unused_variables)]
fn main() -> anyhow::Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    #[cfg(feature = "wgpu")]
    return wgpu::run(cli);
    #[cfg(feature = "tch-gpu")]
    return tch_gpu::run(cli);
    #[cfg(feature = "tch-cpu")]
    return tch_cpu::run(cli);
    #[cfg(any(
        feature = "ndarray",
        feature = "ndarray-blas-netlib",
        feature = "ndarray-blas-openblas",
        feature = "ndarray-blas-accelerate",
    ))]
    return ndarray::run(cli);

    anyhow::bail!("no backend feature enabled; rebuild with --features ndarray, wgpu, tch-cpu or tch-gpu")
}
