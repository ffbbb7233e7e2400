#[macro_use]
extern crate clap;

use {
    anyhow::{Context, Result},
    log::{error, info, warn},
    pseudo_spectral::{
        comm::Communicator, operators::Operators3d, parameters::Parameters,
        restart::RestartState, setofvar::SetOfVariables,
    },
    simplelog::{Config as LogConfig, LevelFilter, TermLogger, TerminalMode},
    std::{fs::File, sync::Arc},
};

#[quit::main]
fn main() {
    let matches = clap_app!(refine =>
        (version: crate_version!())
        (about: "Restarts a spectral state on the grid described by the parameters file.")
        (@arg PARAMETERS: -p --parameters +takes_value +required "Path to file containing the operator parameters.")
        (@arg INPUT: -i --input +takes_value +required "Coarse state file.")
        (@arg OUTPUT: -o --output +takes_value +required "Path of the refined state file.")
    )
    .get_matches();

    TermLogger::init(
        LevelFilter::Debug,
        LogConfig::default(),
        TerminalMode::Mixed,
    )
    .expect("Failed to initialize logger");

    #[cfg(feature = "mpi")]
    let universe = mpi::initialize().unwrap_or_else(|| {
        error!("Failed to initialize MPI");
        quit::with_code(1);
    });
    #[cfg(feature = "mpi")]
    let comm: Arc<dyn Communicator> = Arc::new(pseudo_spectral::comm::MpiComm::new(&universe));
    #[cfg(not(feature = "mpi"))]
    let comm: Arc<dyn Communicator> = Arc::new(pseudo_spectral::comm::SingleProcess);

    let params = {
        // Should never panic as clap should return an error if the argument was not supplied
        let path = matches
            .value_of("PARAMETERS")
            .expect("Path to parameters file not supplied");

        let file = File::open(path).unwrap_or_else(|e| {
            error!("Failed to open {}: \"{}\"", path, e);
            quit::with_code(1);
        });

        let params = serde_yaml::from_reader::<_, Parameters>(file).unwrap_or_else(|e| {
            error!("Failed to parse parameters from {}: \"{}\"", path, e);
            quit::with_code(1);
        });

        info!(
            "Successfully loaded operator parameters from \"{}\": \n{:#?}",
            path, params
        );

        params
    };

    let input = matches.value_of("INPUT").expect("Input path not supplied");
    let output = matches.value_of("OUTPUT").expect("Output path not supplied");

    refine(&params, comm, input, output).unwrap_or_else(|e| {
        error!("Error: \"{:#}\"", e);
        quit::with_code(1);
    });
}

fn refine(
    params: &Parameters,
    comm: Arc<dyn Communicator>,
    input: &str,
    output: &str,
) -> Result<()> {
    let oper = Operators3d::new(params, comm.clone())?;
    let root = comm.rank() == 0;

    // Every rank needs the keys and the coarse shape, only rank 0 sends data
    let coarse = RestartState::load(input)
        .with_context(|| format!("Failed to load coarse state from {}", input))?;

    let oper_params = &params.oper;
    if (coarse.lx, coarse.ly, coarse.lz) != (oper_params.lx, oper_params.ly, oper_params.lz) {
        warn!(
            "Domain lengths change from {:?} to {:?}",
            (coarse.lx, coarse.ly, coarse.lz),
            (oper_params.lx, oper_params.ly, oper_params.lz)
        );
    }

    if root {
        info!(
            "Refining {:?} from {}x{}x{} to {:?}",
            coarse.state.keys(),
            coarse.nx,
            coarse.ny,
            coarse.nz,
            oper.shape_x_seq()
        );
    }

    let keys = coarse
        .state
        .keys()
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>();
    let [n0, n1, n2] = oper.shape_k_loc();
    let mut fine = SetOfVariables::zeros(&keys, [n0, n1, n2]);

    oper.scatter_coarse_into_fine_set(
        if root { Some(&coarse.state) } else { None },
        &mut fine,
        coarse.shape_k(),
    )?;
    oper.dealias(&mut fine);

    if let Some(state) = oper.gather_fine_into_coarse_set(&fine, oper.shape_k_canonical())? {
        let (nx, ny, nz) = params.grid_size();

        RestartState {
            nx,
            ny,
            nz,
            lx: oper_params.lx,
            ly: oper_params.ly,
            lz: oper_params.lz,
            time: coarse.time,
            state,
        }
        .save(output)
        .with_context(|| format!("Failed to write {}", output))?;
    }

    comm.barrier();

    Ok(())
}
